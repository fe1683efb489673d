//! Evaluator agent trait and common types.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use arbiter_core::{Dimension, EvaluationSnapshot, EvaluatorResult};

/// Errors from evaluator agents.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Backend call failed: {0}")]
    Backend(String),

    #[error("Invalid verdict: {0}")]
    InvalidVerdict(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// An evaluator the graph can fan out to.
///
/// # Isolation Contract
/// Each agent operates in isolation:
/// - Sees only the immutable snapshot it is handed
/// - No access to other agents' results during evaluation
/// - No shared mutable state between agents
#[async_trait]
pub trait EvaluatorAgent: Send + Sync {
    /// The dimension this agent scores.
    fn dimension(&self) -> Dimension;

    /// Score the snapshot.
    ///
    /// An `Err` is not fatal: the graph substitutes the configured neutral
    /// score and records the failure.
    async fn evaluate(&self, snapshot: &EvaluationSnapshot) -> Result<EvaluatorResult, AgentError>;

    /// Timeout for this agent. `None` uses the configured evaluator timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Short label for logs and evidence.
    fn kind(&self) -> &'static str;
}
