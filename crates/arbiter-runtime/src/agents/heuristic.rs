//! Agent wrapper for the deterministic heuristics.

use async_trait::async_trait;
use std::time::Instant;

use arbiter_core::{heuristic_for, Dimension, EvaluationSnapshot, Evaluator, EvaluatorResult};

use super::{AgentError, EvaluatorAgent};

/// Runs a synchronous core [`Evaluator`] as an agent.
pub struct HeuristicAgent {
    evaluator: Box<dyn Evaluator>,
}

impl HeuristicAgent {
    pub fn new(evaluator: Box<dyn Evaluator>) -> Self {
        Self { evaluator }
    }

    /// The built-in heuristic for a dimension.
    pub fn for_dimension(dimension: Dimension) -> Self {
        Self::new(heuristic_for(dimension))
    }
}

#[async_trait]
impl EvaluatorAgent for HeuristicAgent {
    fn dimension(&self) -> Dimension {
        self.evaluator.dimension()
    }

    async fn evaluate(&self, snapshot: &EvaluationSnapshot) -> Result<EvaluatorResult, AgentError> {
        let start = Instant::now();
        let result = self.evaluator.evaluate(snapshot);
        Ok(result.with_duration_ms(start.elapsed().as_millis() as u64))
    }

    fn kind(&self) -> &'static str {
        "heuristic"
    }
}
