//! # arbiter-core
//!
//! Deterministic admission control for Arbiter.
//!
//! This crate answers, for a single request:
//! - How much deliberation does it deserve?
//! - How does it score on each admission dimension?
//! - May it run on its own, or must an operator decide?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input and config always produce the same score
//! 2. **No I/O**: Nothing here talks to a backend; the runtime crate does that
//! 3. **Bounded**: Every score, composite and risk lies in [0, 1]
//! 4. **Traceable**: Every decision carries an evidence bundle
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_core::{evaluate_offline, ArbiterConfig, AdmissionDecision};
//!
//! let config = ArbiterConfig::from_yaml_file("arbiter.yaml")?;
//! let verdict = evaluate_offline(&config, "Add a test for parse_config in src/config.rs.", None)?;
//!
//! match verdict.admission.decision {
//!     AdmissionDecision::AutoRun => println!("run it"),
//!     AdmissionDecision::AskOperator => println!("ask: {}", verdict.evidence.summary),
//!     AdmissionDecision::Block => println!("blocked"),
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod evaluators;
pub mod evidence;
pub mod scorer;
pub mod types;

// Re-export main types at crate root
pub use classifier::{ComplexityClassifier, FixedClassifier, KeywordClassifier};
pub use config::{ArbiterConfig, ConfigError};
pub use evaluators::{heuristic_for, Evaluator};
pub use evidence::{DimensionEvidence, EvidenceBundle, OperatorTicket};
pub use scorer::AdmissionScorer;
pub use types::{
    AdmissionDecision, AdmissionScore, Complexity, Dimension, DimensionScores,
    EvaluationSnapshot, EvaluatorResult, Request, RequestError, RequestFlags,
};

use std::collections::BTreeMap;

/// Result of scoring a request without executing it.
#[derive(Debug, Clone)]
pub struct OfflineVerdict {
    pub complexity: Complexity,
    pub results: BTreeMap<Dimension, EvaluatorResult>,
    pub admission: AdmissionScore,
    pub evidence: EvidenceBundle,
}

/// Classify and score a request with the heuristic evaluators only.
///
/// Runs the same tier plan and scorer as the runtime graph, sequentially and
/// without touching any backend. `complexity` overrides the classifier.
pub fn evaluate_offline(
    config: &ArbiterConfig,
    input: &str,
    complexity: Option<Complexity>,
) -> Result<OfflineVerdict, RequestError> {
    let request = Request::from_invocation(
        input,
        &Default::default(),
        config.execution.max_input_chars,
    )?;

    let complexity = complexity
        .unwrap_or_else(|| KeywordClassifier::new(config.classifier.clone()).classify(&request.raw_text));

    let snapshot = EvaluationSnapshot::new(&request.id, &request.raw_text, complexity);

    let results: BTreeMap<Dimension, EvaluatorResult> = config
        .evaluators
        .tiers
        .for_complexity(complexity)
        .iter()
        .map(|dimension| (*dimension, heuristic_for(*dimension).evaluate(&snapshot)))
        .collect();

    let admission = AdmissionScorer::new(config.admission).score(results.values());
    let evidence = EvidenceBundle::new(&request.id, &request.id, complexity, &admission, &results);

    Ok(OfflineVerdict {
        complexity,
        results,
        admission,
        evidence,
    })
}
