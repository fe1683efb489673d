//! Circuit breaker to stop dispatching to failing backends.
//!
//! When a backend fails repeatedly its circuit opens and the router skips
//! it during selection until the recovery timeout has passed.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use arbiter_core::config::CircuitBreakerConfig;

/// State of a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, the backend is skipped
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

impl CircuitState {
    pub fn label(&self) -> &'static str {
        match self {
            CircuitState::Closed { .. } => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }
}

/// Snapshot of one backend's circuit for status output.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub backend: String,
    pub state: &'static str,
}

/// Circuit breaker keyed by backend name.
///
/// Each backend has its own circuit to allow independent recovery.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check if the circuit for a backend is open.
    ///
    /// An open circuit whose recovery timeout has passed moves to half-open
    /// and reports closed, letting a trial call through.
    pub fn is_open(&self, backend: &str) -> bool {
        let states = self.states.read();
        match states.get(backend) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(backend);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, backend: &str) {
        let mut states = self.states.write();
        match states.get(backend).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(backend.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(backend, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        backend.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(backend.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, backend: &str) {
        let mut states = self.states.write();
        let failures = match states.get(backend).cloned() {
            Some(CircuitState::Closed { failures }) => failures,
            None => 0,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    backend.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(backend, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures + 1 >= self.config.failure_threshold {
            states.insert(
                backend.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(
                backend,
                failures = failures + 1,
                "Circuit opened after repeated failures"
            );
        } else {
            states.insert(
                backend.to_string(),
                CircuitState::Closed {
                    failures: failures + 1,
                },
            );
        }
    }

    fn transition_to_half_open(&self, backend: &str) {
        let mut states = self.states.write();
        if matches!(states.get(backend), Some(CircuitState::Open { .. })) {
            states.insert(backend.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(backend, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, backend: &str) -> CircuitState {
        self.states
            .read()
            .get(backend)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// States of every backend that has a recorded circuit, sorted by name.
    pub fn snapshot(&self) -> Vec<CircuitStatus> {
        let mut statuses: Vec<CircuitStatus> = self
            .states
            .read()
            .iter()
            .map(|(backend, state)| CircuitStatus {
                backend: backend.clone(),
                state: state.label(),
            })
            .collect();
        statuses.sort_by(|a, b| a.backend.cmp(&b.backend));
        statuses
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
