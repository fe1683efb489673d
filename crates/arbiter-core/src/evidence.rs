//! Evidence bundles for admission decisions.
//!
//! Every run that reaches ADMIT produces an [`EvidenceBundle`]: the per-dimension
//! scores with their details, the composite, and any errors recorded on the way.
//! An ASK_OPERATOR run returns the bundle wrapped in an [`OperatorTicket`]; an
//! AUTO_RUN run returns it alongside the executed output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AdmissionDecision, AdmissionScore, Complexity, Dimension, EvaluatorResult};

/// One dimension's contribution to the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEvidence {
    pub dimension: Dimension,
    pub score: f64,
    pub detail: String,

    /// The score is a neutral fallback
    pub degraded: bool,
}

/// Everything an operator needs to review an admission decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub trace_id: String,
    pub request_id: String,
    pub complexity: Complexity,
    pub decision: AdmissionDecision,
    pub composite: f64,
    pub risk: f64,
    pub spread: f64,
    pub lucky_average: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Dimension>,

    /// Evaluated dimensions, in weight-vector order
    pub dimensions: Vec<DimensionEvidence>,

    /// Errors recorded before the bundle was built
    pub errors: Vec<String>,

    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl EvidenceBundle {
    pub fn new(
        trace_id: impl Into<String>,
        request_id: impl Into<String>,
        complexity: Complexity,
        admission: &AdmissionScore,
        results: &BTreeMap<Dimension, EvaluatorResult>,
    ) -> Self {
        let dimensions: Vec<DimensionEvidence> = results
            .values()
            .map(|r| DimensionEvidence {
                dimension: r.name,
                score: r.score,
                detail: r.detail.clone(),
                degraded: r.degraded,
            })
            .collect();

        let summary = build_summary(admission, &dimensions);

        Self {
            trace_id: trace_id.into(),
            request_id: request_id.into(),
            complexity,
            decision: admission.decision,
            composite: admission.composite,
            risk: admission.risk,
            spread: admission.spread,
            lucky_average: admission.lucky_average,
            blocked_by: admission.blocked_by,
            dimensions,
            errors: Vec::new(),
            summary,
            created_at: Utc::now(),
        }
    }

    pub fn with_errors(mut self, errors: impl IntoIterator<Item = String>) -> Self {
        self.errors.extend(errors);
        self
    }

    /// Dimensions that fell back to a neutral score.
    pub fn degraded_dimensions(&self) -> Vec<Dimension> {
        self.dimensions
            .iter()
            .filter(|d| d.degraded)
            .map(|d| d.dimension)
            .collect()
    }

    /// The lowest-scoring evaluated dimension.
    pub fn weakest(&self) -> Option<&DimensionEvidence> {
        self.dimensions
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
    }
}

fn build_summary(admission: &AdmissionScore, dimensions: &[DimensionEvidence]) -> String {
    let mut summary = format!(
        "{}: composite {:.2}, risk {:.2} over {} dimension(s).",
        admission.decision,
        admission.composite,
        admission.risk,
        dimensions.len()
    );

    if let Some(dimension) = admission.blocked_by {
        summary.push_str(&format!(" Blocked by {} below the hard floor.", dimension));
    }

    let degraded = dimensions.iter().filter(|d| d.degraded).count();
    if degraded > 0 {
        summary.push_str(&format!(" {} evaluator(s) degraded to neutral.", degraded));
    }

    if admission.lucky_average {
        summary.push_str(&format!(" Spread {:.2} exceeds the alert level.", admission.spread));
    }

    summary
}

/// An escalation handed to a human operator. No autonomous action is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorTicket {
    pub decision_point: String,

    /// Options presented equally, without ranking
    pub options: Vec<String>,

    pub evidence: EvidenceBundle,
}

impl OperatorTicket {
    pub fn new(evidence: EvidenceBundle) -> Self {
        let weakest = evidence.weakest().map(|d| d.dimension);
        Self {
            decision_point: build_decision_point(weakest, &evidence),
            options: build_options(weakest),
            evidence,
        }
    }
}

fn build_decision_point(weakest: Option<Dimension>, evidence: &EvidenceBundle) -> String {
    let concern = match weakest {
        Some(Dimension::Safety) => "Could this cause harm that cannot be undone?",
        Some(Dimension::Correctness) => "Is the request specific enough to execute as written?",
        Some(Dimension::Efficiency) => "Is the scope proportionate to the goal?",
        Some(Dimension::Maintainability) => "Will the result be sustainable to own?",
        Some(Dimension::Beauty) => "Is the request clear enough to act on?",
        None => "No dimension was evaluated.",
    };
    format!(
        "Should this run proceed without supervision? Composite {:.2}, risk {:.2}. {}",
        evidence.composite, evidence.risk, concern
    )
}

fn build_options(weakest: Option<Dimension>) -> Vec<String> {
    let mut options = vec![
        "Approve and execute as requested".to_string(),
        "Reject the request".to_string(),
    ];
    match weakest {
        Some(Dimension::Safety) => {
            options.push("Execute in a sandbox or dry-run mode first".to_string())
        }
        Some(Dimension::Correctness) | Some(Dimension::Beauty) => {
            options.push("Ask the requester to clarify and resubmit".to_string())
        }
        Some(Dimension::Efficiency) | Some(Dimension::Maintainability) => {
            options.push("Narrow the scope and resubmit".to_string())
        }
        None => {}
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::AdmissionScorer;

    fn results() -> BTreeMap<Dimension, EvaluatorResult> {
        let mut map = BTreeMap::new();
        map.insert(Dimension::Safety, EvaluatorResult::new(Dimension::Safety, 0.7, "force push"));
        map.insert(
            Dimension::Correctness,
            EvaluatorResult::neutral(Dimension::Correctness, 0.5, "evaluator timed out"),
        );
        map
    }

    #[test]
    fn test_bundle_carries_scores_and_degradation() {
        let results = results();
        let admission = AdmissionScorer::default().score(results.values());
        let bundle = EvidenceBundle::new("trace", "req", Complexity::Medium, &admission, &results)
            .with_errors(vec!["evaluate(correctness): timed out".to_string()]);

        assert_eq!(bundle.decision, AdmissionDecision::AskOperator);
        assert_eq!(bundle.dimensions.len(), 2);
        assert_eq!(bundle.degraded_dimensions(), vec![Dimension::Correctness]);
        assert_eq!(bundle.errors.len(), 1);
        assert!(bundle.summary.contains("1 evaluator(s) degraded"));
    }

    #[test]
    fn test_ticket_targets_weakest_dimension() {
        let results = results();
        let admission = AdmissionScorer::default().score(results.values());
        let bundle = EvidenceBundle::new("trace", "req", Complexity::Medium, &admission, &results);
        let ticket = OperatorTicket::new(bundle);

        assert!(ticket.decision_point.contains("specific enough"));
        assert_eq!(ticket.options.len(), 3);
        assert!(ticket.options.iter().any(|o| o.contains("clarify")));
    }

    #[test]
    fn test_bundle_serializes_decision() {
        let results = results();
        let admission = AdmissionScorer::default().score(results.values());
        let bundle = EvidenceBundle::new("trace", "req", Complexity::Medium, &admission, &results);
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["decision"], "ASK_OPERATOR");
        assert!(json.get("blocked_by").is_none());
    }
}
