//! Deterministic local backend.
//!
//! Echoes the prompt back with a fixed prefix. Always compiled so that a
//! default configuration runs end to end with no network and no credentials.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::config::BackendSpec;

use super::{Backend, BackendFactory, GenerateOptions, Generation, ProviderError, SecretProvider, TokenUsage};

/// A backend that answers with its input.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    name: String,
    model: String,
}

impl EchoBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "echo".to_string(),
        }
    }
}

#[async_trait]
impl Backend for EchoBackend {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError> {
        let max_chars = (options.max_tokens as usize).saturating_mul(4);
        let text: String = format!("[{}] {}", self.name, prompt)
            .chars()
            .take(max_chars)
            .collect();

        let usage = TokenUsage {
            prompt_tokens: self.estimate_tokens(prompt),
            completion_tokens: self.estimate_tokens(&text),
        };

        Ok(Generation {
            text,
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for [`EchoBackend`].
pub struct EchoBackendFactory;

impl BackendFactory for EchoBackendFactory {
    fn kind(&self) -> &'static str {
        "echo"
    }

    fn create(
        &self,
        spec: &BackendSpec,
        _secrets: &dyn SecretProvider,
    ) -> Result<Arc<dyn Backend>, ProviderError> {
        Ok(Arc::new(EchoBackend {
            name: spec.name.clone(),
            model: spec.model.clone(),
        }))
    }

    fn description(&self) -> &'static str {
        "Local echo backend for dry runs"
    }
}
