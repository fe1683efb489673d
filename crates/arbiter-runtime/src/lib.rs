//! # arbiter-runtime
//!
//! Async orchestration for Arbiter.
//!
//! `arbiter-core` decides; this crate acts. It runs the orchestration graph
//! on tokio, fans out to evaluator agents, routes execution across backends
//! with fallback and caching, and runs shadow comparisons on the side.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use arbiter_core::ArbiterConfig;
//! use arbiter_runtime::Orchestrator;
//!
//! let config = ArbiterConfig::from_yaml_file("arbiter.yaml")?;
//! let orchestrator = Orchestrator::from_config(config)?;
//!
//! let response = orchestrator
//!     .invoke("Add a unit test for the date parser", &HashMap::new())
//!     .await;
//!
//! if let Some(ticket) = &response.ticket {
//!     println!("Needs an operator: {}", ticket.decision_point);
//! }
//! ```
//!
//! ## Features
//!
//! - `anthropic`: Anthropic Messages API backend
//! - `openai`: hosted OpenAI chat completions backend
//! - `local`: OpenAI-compatible local servers (Ollama, vLLM)
//! - `all-providers`: all of the above
//!
//! The echo backend is always available.

pub mod agents;
pub mod cache;
pub mod evidence;
pub mod graph;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod router;
pub mod shadow;

pub use agents::{AgentError, EvaluatorAgent, EvaluatorRegistry, HeuristicAgent, LlmJudgeAgent};
pub use cache::{CacheKey, CachedResponse, ResponseCache};
pub use evidence::{EvidenceLog, EvidenceStream};
pub use graph::{FailureKind, GraphExecutor, GraphState, Node, NodeError, RunProfile, RunReport};
pub use orchestrator::{InvocationResponse, Orchestrator, OrchestratorBuilder, OrchestratorError};
pub use providers::{
    Backend, BackendFactory, BackendRegistry, ErrorClass, GenerateOptions, Generation,
    ProviderError, TokenUsage,
};
pub use router::{
    ProviderRouter, RoutedResponse, RouterError, RoutingContext, RoutingDecision, RoutingHistory,
};
pub use shadow::{ShadowCompletion, ShadowController, ShadowDiff};
