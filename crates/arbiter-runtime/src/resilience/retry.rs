//! Per-backend retry with exponential backoff.
//!
//! Only transient provider errors are retried. Once retries are used up the
//! router moves on to the next backend in the fallback chain.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

use arbiter_core::config::RetryConfig;

use crate::providers::ProviderError;

/// Retry policy for one backend call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_retries_per_backend: 0,
            ..RetryConfig::default()
        })
    }

    pub fn max_retries(&self) -> usize {
        self.config.max_retries_per_backend
    }

    /// Run `operation`, retrying transient failures with backoff.
    pub async fn execute<F, Fut, T>(&self, backend: &str, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if self.config.max_retries_per_backend == 0 {
            let mut operation = operation;
            return operation().await;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.base_delay)
            .with_max_delay(self.config.max_delay)
            .with_max_times(self.config.max_retries_per_backend)
            .with_jitter();

        operation
            .retry(backoff)
            .when(ProviderError::is_retryable)
            .notify(|error: &ProviderError, delay: Duration| {
                tracing::warn!(
                    backend,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying backend after transient error"
                );
            })
            .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
