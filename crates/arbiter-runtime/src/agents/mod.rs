//! Evaluator agents.
//!
//! Every dimension has one agent: either a deterministic heuristic from
//! `arbiter-core` or a judge that asks a backend through the router.

mod heuristic;
mod llm_judge;
mod registry;
mod traits;

pub use heuristic::HeuristicAgent;
pub use llm_judge::{parse_verdict, LlmJudgeAgent};
pub use registry::EvaluatorRegistry;
pub use traits::{AgentError, EvaluatorAgent};
