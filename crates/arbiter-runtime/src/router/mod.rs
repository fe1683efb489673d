//! Provider router.
//!
//! Picks a backend for each generation, falls back down the chain on
//! transient failures, and caches successful answers.
//!
//! ```text
//! route ──► cache hit? ──yes──► return cached
//!               │ no
//!               ▼
//!   selected ─► fallback[0] ─► fallback[1] ─► ... ─► Exhausted
//!      │ fatal error stops the chain immediately
//! ```

mod history;
mod selection;

pub use history::{RoutingHistory, RoutingOutcome, RoutingRecord};
pub use selection::{rank, select, RoutingContext, RoutingDecision, FORCED_CONFIDENCE, LOCAL_CONFIDENCE};

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use arbiter_core::config::{BackendSpec, RouterConfig, RoutingWeights};

use crate::cache::{CacheKey, CachedResponse, ResponseCache};
use crate::evidence::EvidenceLog;
use crate::providers::{
    Backend, BackendRegistry, ErrorClass, GenerateOptions, Generation, ProviderError, SecretProvider,
    TokenUsage,
};
use crate::resilience::{CircuitBreaker, RetryPolicy};

/// Errors from the router.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No backends configured")]
    NoBackends,

    #[error("Backend '{0}' has no matching configuration")]
    UnknownBackend(String),

    #[error("Configured backend '{0}' has no adapter instance")]
    MissingAdapter(String),

    #[error("Failed to create backend '{backend}': {source}")]
    Provider {
        backend: String,
        #[source]
        source: ProviderError,
    },

    #[error("Backend '{backend}' failed: {source}")]
    Fatal {
        backend: String,
        attempted: Vec<String>,
        #[source]
        source: ProviderError,
    },

    #[error("All backends failed (attempted: {attempted:?}): {last_error}")]
    Exhausted {
        attempted: Vec<String>,
        last_error: String,
    },
}

impl RouterError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RouterError::Exhausted { .. } => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// Backends tried before the error, in order.
    pub fn attempted(&self) -> &[String] {
        match self {
            RouterError::Fatal { attempted, .. } | RouterError::Exhausted { attempted, .. } => {
                attempted
            }
            _ => &[],
        }
    }
}

/// A successful routed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedGeneration {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub cached: bool,

    /// Backends dispatched to, in order. Empty on a cache hit.
    pub attempted: Vec<String>,

    pub decision: RoutingDecision,
}

/// Outcome of [`ProviderRouter::execute_with_routing`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub success: bool,
    pub text: Option<String>,
    pub provider_used: Option<String>,
    pub model: Option<String>,
    pub attempted: Vec<String>,
    pub decision: Option<RoutingDecision>,
    pub cached: bool,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
}

impl RoutedResponse {
    fn failed(decision: Option<RoutingDecision>, error: &RouterError) -> Self {
        Self {
            success: false,
            text: None,
            provider_used: None,
            model: None,
            attempted: error.attempted().to_vec(),
            decision,
            cached: false,
            error: Some(error.to_string()),
            error_class: Some(error.class()),
        }
    }
}

impl From<RoutedGeneration> for RoutedResponse {
    fn from(generation: RoutedGeneration) -> Self {
        Self {
            success: true,
            text: Some(generation.text),
            provider_used: Some(generation.provider),
            model: Some(generation.model),
            attempted: generation.attempted,
            decision: Some(generation.decision),
            cached: generation.cached,
            error: None,
            error_class: None,
        }
    }
}

/// Routes generations across a pool of backends.
///
/// Shared by every run (`Arc<ProviderRouter>`); the cache, history and
/// circuit breaker are the only cross-run state.
pub struct ProviderRouter {
    specs: Vec<BackendSpec>,
    backends: HashMap<String, Arc<dyn Backend>>,
    weights: RoutingWeights,
    cache: Option<ResponseCache>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    history: RoutingHistory,
}

impl ProviderRouter {
    /// Build a router from configuration and ready-made backends.
    ///
    /// Every configured backend needs exactly one instance with the same name.
    pub fn new(config: &RouterConfig, backends: Vec<Arc<dyn Backend>>) -> Result<Self, RouterError> {
        if config.backends.is_empty() {
            return Err(RouterError::NoBackends);
        }

        let mut by_name = HashMap::with_capacity(backends.len());
        for backend in backends {
            let name = backend.name().to_string();
            if config.backend(&name).is_none() {
                return Err(RouterError::UnknownBackend(name));
            }
            by_name.insert(name, backend);
        }
        if let Some(missing) = config.backends.iter().find(|s| !by_name.contains_key(&s.name)) {
            return Err(RouterError::MissingAdapter(missing.name.clone()));
        }

        let cache = config
            .cache
            .enabled
            .then(|| ResponseCache::from_config(&config.cache));

        Ok(Self {
            specs: config.backends.clone(),
            backends: by_name,
            weights: config.weights,
            cache,
            retry: RetryPolicy::new(config.retry),
            breaker: CircuitBreaker::new(config.circuit_breaker),
            history: RoutingHistory::new(config.history_capacity),
        })
    }

    /// Build every configured backend through the registry.
    pub fn from_config(
        config: &RouterConfig,
        registry: &BackendRegistry,
        secrets: &dyn SecretProvider,
    ) -> Result<Self, RouterError> {
        let backends = config
            .backends
            .iter()
            .map(|spec| {
                registry
                    .create(spec, secrets)
                    .map_err(|source| RouterError::Provider {
                        backend: spec.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(config, backends)
    }

    /// Mirror routing history to the evidence log.
    pub fn with_evidence_log(mut self, log: EvidenceLog) -> Self {
        self.history = RoutingHistory::new(self.history.capacity()).with_log(log);
        self
    }

    /// Replace the response cache (`None` disables caching).
    pub fn with_cache(mut self, cache: Option<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn history(&self) -> &RoutingHistory {
        &self.history
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn specs(&self) -> &[BackendSpec] {
        &self.specs
    }

    pub fn has_backend(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// Choose a backend without dispatching.
    pub fn route(&self, context: &RoutingContext) -> Result<RoutingDecision, RouterError> {
        let decision = select(&self.specs, &self.weights, context, |name| {
            self.breaker.is_open(name)
        })
        .ok_or(RouterError::NoBackends)?;

        tracing::debug!(
            trace_id = %context.trace_id,
            backend = %decision.selected_provider,
            confidence = decision.confidence,
            fallback = ?decision.fallback_chain,
            "Routing decision"
        );
        Ok(decision)
    }

    /// Route and dispatch a prompt.
    pub async fn dispatch(
        &self,
        prompt: &str,
        context: &RoutingContext,
    ) -> Result<RoutedGeneration, RouterError> {
        let decision = self.route(context)?;
        self.dispatch_decided(prompt, context, decision).await
    }

    /// Route and dispatch a prompt, folding every failure into the response.
    pub async fn execute_with_routing(&self, prompt: &str, context: &RoutingContext) -> RoutedResponse {
        let decision = match self.route(context) {
            Ok(decision) => decision,
            Err(e) => return RoutedResponse::failed(None, &e),
        };

        match self.dispatch_decided(prompt, context, decision.clone()).await {
            Ok(generation) => generation.into(),
            Err(e) => {
                tracing::warn!(trace_id = %context.trace_id, error = %e, "Routed execution failed");
                RoutedResponse::failed(Some(decision), &e)
            }
        }
    }

    /// Health of every backend, by name.
    pub async fn health(&self) -> BTreeMap<String, bool> {
        let checks = self.specs.iter().filter_map(|spec| {
            self.backends.get(&spec.name).map(|backend| {
                let name = spec.name.clone();
                async move { (name, backend.health_check().await) }
            })
        });
        futures::future::join_all(checks).await.into_iter().collect()
    }

    async fn dispatch_decided(
        &self,
        prompt: &str,
        context: &RoutingContext,
        decision: RoutingDecision,
    ) -> Result<RoutedGeneration, RouterError> {
        let key = CacheKey::new(&decision.selected_provider, prompt, &context.options);
        if let Some(cached) = self.cached(context, &key).await {
            tracing::debug!(trace_id = %context.trace_id, backend = %cached.provider, "Cache hit");
            self.record(context, &decision, &cached.provider, RoutingOutcome::CacheHit, None).await;
            return Ok(RoutedGeneration {
                text: cached.text,
                provider: cached.provider,
                model: cached.model,
                usage: cached.usage,
                cached: true,
                attempted: Vec::new(),
                decision,
            });
        }

        let order: Vec<String> = decision.attempt_order().map(str::to_string).collect();
        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for name in order.iter().map(String::as_str) {
            let (Some(backend), Some(spec)) = (self.backends.get(name), self.spec(name)) else {
                continue;
            };
            if !attempted.is_empty() {
                tracing::info!(
                    trace_id = %context.trace_id,
                    backend = name,
                    "Falling back to next backend"
                );
            }
            attempted.push(name.to_string());

            let options = GenerateOptions {
                timeout: spec.timeout,
                ..context.options.clone()
            };
            let backend = backend.as_ref();
            let options_ref = &options;
            let result = self
                .retry
                .execute(name, move || call_backend(backend, prompt, options_ref))
                .await;

            match result {
                Ok(generation) => {
                    self.breaker.record_success(name);
                    self.record(context, &decision, name, RoutingOutcome::Success, None).await;
                    return Ok(self.finish(context, prompt, name, generation, attempted, decision).await);
                }
                Err(error) => {
                    self.breaker.record_failure(name);
                    let fatal = error.class() == ErrorClass::Fatal;
                    let outcome = if fatal {
                        RoutingOutcome::FatalFailure
                    } else {
                        RoutingOutcome::TransientFailure
                    };
                    self.record(context, &decision, name, outcome, Some(error.to_string())).await;
                    tracing::warn!(
                        trace_id = %context.trace_id,
                        backend = name,
                        error = %error,
                        fatal,
                        "Backend dispatch failed"
                    );

                    if fatal {
                        return Err(RouterError::Fatal {
                            backend: name.to_string(),
                            attempted,
                            source: error,
                        });
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(RouterError::Exhausted {
            attempted,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no backend was dispatched".to_string()),
        })
    }

    async fn cached(&self, context: &RoutingContext, key: &CacheKey) -> Option<CachedResponse> {
        match (&self.cache, context.use_cache) {
            (Some(cache), true) => cache.get(key).await,
            _ => None,
        }
    }

    async fn finish(
        &self,
        context: &RoutingContext,
        prompt: &str,
        provider: &str,
        generation: Generation,
        attempted: Vec<String>,
        decision: RoutingDecision,
    ) -> RoutedGeneration {
        // Stored under the backend that answered, not the one selected
        if let (Some(cache), true) = (&self.cache, context.use_cache) {
            cache
                .insert(
                    CacheKey::new(provider, prompt, &context.options),
                    CachedResponse {
                        text: generation.text.clone(),
                        provider: provider.to_string(),
                        model: generation.model.clone(),
                        usage: generation.usage,
                    },
                )
                .await;
        }

        RoutedGeneration {
            text: generation.text,
            provider: provider.to_string(),
            model: generation.model,
            usage: generation.usage,
            cached: false,
            attempted,
            decision,
        }
    }

    fn spec(&self, name: &str) -> Option<&BackendSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    async fn record(
        &self,
        context: &RoutingContext,
        decision: &RoutingDecision,
        backend: &str,
        outcome: RoutingOutcome,
        error: Option<String>,
    ) {
        self.history.record(RoutingRecord {
            timestamp: Utc::now(),
            trace_id: context.trace_id.clone(),
            backend: backend.to_string(),
            reasoning: decision.reasoning.clone(),
            confidence: decision.confidence,
            outcome,
            error,
        })
        .await;
    }
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("backends", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("cache", &self.cache)
            .field("history", &self.history)
            .finish()
    }
}

/// One backend call under its timeout. A panicking backend is reported as
/// an internal error instead of unwinding through the router.
async fn call_backend(
    backend: &dyn Backend,
    prompt: &str,
    options: &GenerateOptions,
) -> Result<Generation, ProviderError> {
    let call = AssertUnwindSafe(backend.generate(prompt, options)).catch_unwind();
    match tokio::time::timeout(options.timeout, call).await {
        Err(_) => Err(ProviderError::Timeout(options.timeout)),
        Ok(Err(_)) => Err(ProviderError::Internal(format!(
            "backend '{}' panicked",
            backend.name()
        ))),
        Ok(Ok(result)) => result,
    }
}
