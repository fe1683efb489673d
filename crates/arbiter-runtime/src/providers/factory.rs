//! Backend factory pattern for building the backend pool from config.
//!
//! Each adapter kind registers a factory. The router's pool is built by
//! looking up every configured [`BackendSpec`] by its `kind`.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = BackendRegistry::with_defaults();
//! let backend = registry.create(&spec, &EnvSecretProvider::new())?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use arbiter_core::config::BackendSpec;

use super::{Backend, ProviderError, SecretProvider};

/// Factory for creating backends from configuration.
pub trait BackendFactory: Send + Sync {
    /// Unique identifier for this adapter kind.
    ///
    /// Examples: "echo", "anthropic", "openai", "local"
    fn kind(&self) -> &'static str;

    /// Create a backend from its spec, resolving credentials through `secrets`.
    fn create(
        &self,
        spec: &BackendSpec,
        secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn Backend>, ProviderError>;

    /// Validate a backend spec without creating a backend.
    fn validate(&self, _spec: &BackendSpec) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Human-readable description of this adapter.
    fn description(&self) -> &'static str {
        "Backend provider"
    }
}

/// Registry of available backend factories, keyed by kind.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. A factory with the same kind is replaced.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.insert(factory.kind().to_string(), factory);
    }

    /// Create a backend from its spec.
    pub fn create(
        &self,
        spec: &BackendSpec,
        secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn Backend>, ProviderError> {
        let factory = self.factory(&spec.kind)?;
        factory.validate(spec)?;
        factory.create(spec, secrets)
    }

    /// Create every backend in the list, in order.
    pub fn create_all(
        &self,
        specs: &[BackendSpec],
        secrets: &dyn SecretProvider,
    ) -> Result<Vec<Arc<dyn Backend>>, ProviderError> {
        specs.iter().map(|spec| self.create(spec, secrets)).collect()
    }

    /// Validate a backend spec against its factory.
    pub fn validate(&self, spec: &BackendSpec) -> Result<(), ProviderError> {
        self.factory(&spec.kind)?.validate(spec)
    }

    /// List available adapter kinds.
    pub fn available_kinds(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    fn factory(&self, kind: &str) -> Result<&Arc<dyn BackendFactory>, ProviderError> {
        self.factories.get(kind).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown backend kind: '{}'. Available: {:?}",
                kind,
                self.available_kinds()
            ))
        })
    }

    /// Create a registry with every adapter compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::EchoBackendFactory));

        #[cfg(feature = "anthropic")]
        registry.register(Arc::new(super::AnthropicBackendFactory));

        #[cfg(feature = "openai")]
        registry.register(Arc::new(super::OpenAiCompatBackendFactory::openai()));

        #[cfg(feature = "local")]
        registry.register(Arc::new(super::OpenAiCompatBackendFactory::local()));

        registry
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.available_kinds())
            .finish()
    }
}
