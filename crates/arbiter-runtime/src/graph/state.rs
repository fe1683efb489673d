//! Per-run graph state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use arbiter_core::{AdmissionScore, Complexity, Dimension, EvaluatorResult};

/// A node of the orchestration graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Intake,
    Classify,
    Evaluate(Dimension),
    Merge,
    Admit,
    Execute,
    Escalate,
    Verify,
    Report,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Intake => f.write_str("INTAKE"),
            Node::Classify => f.write_str("CLASSIFY"),
            Node::Evaluate(dimension) => write!(f, "EVALUATE({})", dimension),
            Node::Merge => f.write_str("MERGE"),
            Node::Admit => f.write_str("ADMIT"),
            Node::Execute => f.write_str("EXECUTE"),
            Node::Escalate => f.write_str("ESCALATE"),
            Node::Verify => f.write_str("VERIFY"),
            Node::Report => f.write_str("REPORT"),
        }
    }
}

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed input; reported immediately, never retried
    Validation,

    /// Retried down the fallback chain; surfaced only on exhaustion
    ProviderTransient,

    /// Not retried; surfaced immediately
    ProviderFatal,

    /// Degraded to a neutral score; the run continues
    EvaluatorFailure,

    /// Safety below the hard floor; no autonomous execution
    AdmissionHardBlock,

    /// Executed output failed a post-check; the run continues
    Verification,
}

impl FailureKind {
    /// Whether this kind ends the run.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            FailureKind::Validation
                | FailureKind::ProviderTransient
                | FailureKind::ProviderFatal
                | FailureKind::AdmissionHardBlock
        )
    }
}

/// An error recorded against one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    pub kind: FailureKind,
    pub node: Node,
    pub message: String,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.message)
    }
}

/// State of one run. Owned by the executor, never shared.
#[derive(Debug, Clone, Serialize)]
pub struct GraphState {
    pub trace_id: String,
    pub request_id: String,
    pub input: String,
    pub step_counter: u32,
    pub complexity: Option<Complexity>,
    pub evaluator_outputs: BTreeMap<Dimension, EvaluatorResult>,
    pub errors: Vec<NodeError>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub admission: Option<AdmissionScore>,
    pub visited: Vec<Node>,
}

impl GraphState {
    pub fn new(trace_id: impl Into<String>, request_id: impl Into<String>, input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            trace_id: trace_id.into(),
            request_id: request_id.into(),
            input: input.into(),
            step_counter: 0,
            complexity: None,
            evaluator_outputs: BTreeMap::new(),
            errors: Vec::new(),
            started_at: now,
            updated_at: now,
            admission: None,
            visited: Vec::new(),
        }
    }

    /// Mark a node transition.
    pub fn enter(&mut self, node: Node) {
        self.step_counter += 1;
        self.updated_at = Utc::now();
        self.visited.push(node);
        tracing::debug!(trace_id = %self.trace_id, step = self.step_counter, node = %node, "Entering node");
    }

    pub fn record_error(&mut self, kind: FailureKind, node: Node, message: impl Into<String>) {
        let error = NodeError {
            kind,
            node,
            message: message.into(),
        };
        tracing::warn!(trace_id = %self.trace_id, kind = ?kind, node = %node, "{}", error.message);
        self.errors.push(error);
        self.updated_at = Utc::now();
    }

    /// Insert an evaluator result under its own dimension.
    ///
    /// A second result for the same dimension is dropped and recorded as an
    /// error; the first one stands.
    pub fn insert_result(&mut self, result: EvaluatorResult) -> bool {
        let dimension = result.name;
        if self.evaluator_outputs.contains_key(&dimension) {
            self.record_error(
                FailureKind::EvaluatorFailure,
                Node::Merge,
                format!("duplicate result for {} dropped", dimension),
            );
            return false;
        }
        self.evaluator_outputs.insert(dimension, result);
        self.updated_at = Utc::now();
        true
    }

    pub fn has_visited(&self, node: Node) -> bool {
        self.visited.contains(&node)
    }

    /// First error that ended the run, if any.
    pub fn fatal_error(&self) -> Option<&NodeError> {
        self.errors.iter().find(|e| e.kind.is_fatal())
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn elapsed_ms(&self) -> u64 {
        (self.updated_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_tracks_steps() {
        let mut state = GraphState::new("t", "r", "input");
        state.enter(Node::Intake);
        state.enter(Node::Classify);

        assert_eq!(state.step_counter, 2);
        assert_eq!(state.visited, vec![Node::Intake, Node::Classify]);
        assert!(state.has_visited(Node::Classify));
        assert!(!state.has_visited(Node::Admit));
    }

    #[test]
    fn test_duplicate_result_is_dropped() {
        let mut state = GraphState::new("t", "r", "input");
        assert!(state.insert_result(EvaluatorResult::new(Dimension::Safety, 0.9, "first")));
        assert!(!state.insert_result(EvaluatorResult::new(Dimension::Safety, 0.1, "second")));

        assert_eq!(state.evaluator_outputs[&Dimension::Safety].detail, "first");
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].kind, FailureKind::EvaluatorFailure);
        assert!(state.fatal_error().is_none());
    }

    #[test]
    fn test_node_display() {
        assert_eq!(Node::Evaluate(Dimension::Beauty).to_string(), format!("EVALUATE({})", Dimension::Beauty));
        let error = NodeError {
            kind: FailureKind::Validation,
            node: Node::Intake,
            message: "empty".to_string(),
        };
        assert_eq!(error.to_string(), "INTAKE: empty");
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(FailureKind::AdmissionHardBlock.is_fatal());
        assert!(FailureKind::ProviderTransient.is_fatal());
        assert!(!FailureKind::EvaluatorFailure.is_fatal());
        assert!(!FailureKind::Verification.is_fatal());
    }
}
