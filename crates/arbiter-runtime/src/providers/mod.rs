//! Backend provider abstractions.
//!
//! A [`Backend`] turns a prompt into text. The router picks which backend
//! runs each step; adapters here only know how to talk to one service.
//!
//! ## Security
//!
//! Credentials are resolved through a [`SecretProvider`] and held as
//! [`ApiCredential`], which never prints its value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod echo;
mod factory;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

#[cfg(any(feature = "openai", feature = "local"))]
mod openai;

pub use echo::{EchoBackend, EchoBackendFactory};
pub use factory::{BackendFactory, BackendRegistry};
pub use secrets::{
    ApiCredential, CredentialSource, EnvSecretProvider, SecretProvider, StaticSecretProvider,
};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicBackend, AnthropicBackendFactory};

#[cfg(any(feature = "openai", feature = "local"))]
pub use openai::{OpenAiCompatBackend, OpenAiCompatBackendFactory};

/// Errors from backend providers.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Backend failed internally: {0}")]
    Internal(String),
}

/// Whether a failure is worth trying elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retried down the fallback chain
    Transient,

    /// Stops the chain immediately
    Fatal,
}

impl ProviderError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => ErrorClass::Transient,
            ProviderError::ApiError { status, .. } if *status >= 500 || *status == 429 => {
                ErrorClass::Transient
            }
            // Malformed output from one backend says nothing about the next
            ProviderError::ParseError(_) | ProviderError::Internal(_) => ErrorClass::Transient,
            ProviderError::ApiError { .. }
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Options for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Model override; `None` uses the backend's configured model
    pub model: Option<String>,

    /// Optional system instruction
    pub system: Option<String>,

    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    pub temperature: f32,

    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            model: None,
            system: None,
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(15),
        }
    }
}

impl GenerateOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Text produced by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,

    /// Model that actually answered
    pub model: String,

    pub usage: TokenUsage,
}

/// Token usage from a generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A computation provider the router can dispatch to.
///
/// Implementations must be cheap to share: the router holds them as
/// `Arc<dyn Backend>` and calls them from many runs at once.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<Generation, ProviderError>;

    /// Check if backend is healthy.
    async fn health_check(&self) -> bool;

    /// Backend name, unique within the pool.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 chars per token
        (text.len() / 4) as u32
    }
}
