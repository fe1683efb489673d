//! Resilience patterns for backend dispatch.
//!
//! - Circuit breaker per backend, consulted by the router during selection
//! - Retry with exponential backoff before moving down the fallback chain

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, CircuitStatus};
pub use retry::RetryPolicy;
