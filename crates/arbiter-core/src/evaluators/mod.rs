//! Specialist evaluators.
//!
//! Each admission dimension has one evaluator that answers a single question
//! about the request and returns a bounded score. Evaluators run in isolation:
//! they see an immutable [`EvaluationSnapshot`] and nothing else.
//!
//! The heuristics here are deterministic and cheap. The runtime can replace
//! any of them with a backend-assisted judge without changing the contract.

pub mod patterns;

mod beauty;
mod correctness;
mod efficiency;
mod maintainability;
mod safety;

pub use beauty::BeautyEvaluator;
pub use correctness::CorrectnessEvaluator;
pub use efficiency::EfficiencyEvaluator;
pub use maintainability::MaintainabilityEvaluator;
pub use safety::SafetyEvaluator;

use crate::types::{clamp_unit, Dimension, EvaluationSnapshot, EvaluatorResult};

/// The narrow contract every specialist evaluator implements.
pub trait Evaluator: Send + Sync {
    /// The dimension this evaluator scores.
    fn dimension(&self) -> Dimension;

    /// Score the snapshot. Must return a score in [0, 1].
    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult;

    /// The question this evaluator asks.
    fn question(&self) -> &'static str {
        match self.dimension() {
            Dimension::Correctness => "Is the request specific enough to get right?",
            Dimension::Safety => "Could executing this cause harm that cannot be undone?",
            Dimension::Efficiency => "Is the scope proportionate to the goal?",
            Dimension::Maintainability => "Will the result be sustainable to own?",
            Dimension::Beauty => "Is the request clear and well-formed?",
        }
    }
}

/// Deterministic heuristic evaluator for a dimension.
pub fn heuristic_for(dimension: Dimension) -> Box<dyn Evaluator> {
    match dimension {
        Dimension::Correctness => Box::new(CorrectnessEvaluator::new()),
        Dimension::Safety => Box::new(SafetyEvaluator::new()),
        Dimension::Efficiency => Box::new(EfficiencyEvaluator::new()),
        Dimension::Maintainability => Box::new(MaintainabilityEvaluator::new()),
        Dimension::Beauty => Box::new(BeautyEvaluator::new()),
    }
}

/// Running tally of score adjustments for one evaluation.
///
/// Starts from a base score; every adjustment is kept as a note so the
/// result detail explains how the score was reached.
#[derive(Debug, Clone)]
pub(crate) struct ScoreSheet {
    dimension: Dimension,
    score: f64,
    notes: Vec<String>,
}

impl ScoreSheet {
    pub(crate) fn new(dimension: Dimension, base: f64) -> Self {
        Self {
            dimension,
            score: base,
            notes: Vec::new(),
        }
    }

    pub(crate) fn adjust(&mut self, delta: f64, note: impl Into<String>) {
        self.score += delta;
        self.notes.push(format!("{:+.2} {}", delta, note.into()));
    }

    pub(crate) fn score(&self) -> f64 {
        clamp_unit(self.score)
    }

    pub(crate) fn finish(self) -> EvaluatorResult {
        let detail = if self.notes.is_empty() {
            "no findings".to_string()
        } else {
            self.notes.join("; ")
        };
        EvaluatorResult::new(self.dimension, self.score, detail)
    }
}
