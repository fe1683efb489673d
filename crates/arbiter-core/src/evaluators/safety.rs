//! Safety evaluator
//!
//! **Question**: Could executing this cause harm that cannot be undone?
//!
//! Safety starts at 1.0 and loses ground for destructive operations,
//! embedded credentials, PII and attempts to get around safeguards. The
//! scorer derives risk as `1 - safety`, so this evaluator alone can force
//! a BLOCK.

use crate::types::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::patterns::{contains_credentials, contains_pii, destructive_operations, BYPASS_PATTERN};
use super::{Evaluator, ScoreSheet};

/// Penalty for each destructive operation beyond the most severe one.
const EXTRA_DESTRUCTIVE_PENALTY: f64 = 0.1;
const CREDENTIAL_PENALTY: f64 = 0.5;
const PII_PENALTY: f64 = 0.2;
const BYPASS_PENALTY: f64 = 0.4;

/// The safety evaluator.
pub struct SafetyEvaluator;

impl SafetyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SafetyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for SafetyEvaluator {
    fn dimension(&self) -> Dimension {
        Dimension::Safety
    }

    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult {
        let input = &snapshot.input;
        let mut sheet = ScoreSheet::new(self.dimension(), 1.0);

        let mut destructive = destructive_operations(input);
        destructive.sort_by(|a, b| b.1.total_cmp(&a.1));
        if let Some((name, severity)) = destructive.first() {
            sheet.adjust(-severity, format!("destructive operation: {}", name));
        }
        for (name, _) in destructive.iter().skip(1) {
            sheet.adjust(-EXTRA_DESTRUCTIVE_PENALTY, format!("additional destructive operation: {}", name));
        }

        if contains_credentials(input) {
            sheet.adjust(-CREDENTIAL_PENALTY, "credential material in request");
        }

        if contains_pii(input) {
            sheet.adjust(-PII_PENALTY, "personal data in request");
        }

        if BYPASS_PATTERN.is_match(input) {
            sheet.adjust(-BYPASS_PENALTY, "asks to bypass a safeguard");
        }

        sheet.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complexity;

    fn score(input: &str) -> f64 {
        let snapshot = EvaluationSnapshot::new("t", input, Complexity::Low);
        SafetyEvaluator::new().evaluate(&snapshot).score
    }

    #[test]
    fn test_benign_request_is_fully_safe() {
        assert_eq!(score("Summarize the README in two sentences."), 1.0);
    }

    #[test]
    fn test_recursive_delete_drops_below_block_floor() {
        assert!(score("run rm -rf / on the build host") < 0.2);
    }

    #[test]
    fn test_credentials_halve_safety() {
        let s = score("use api_key=sk_live_abcdefghijklmnop to call the service");
        assert!((s - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_penalties_accumulate_and_clamp() {
        let s = score("bypass security, DROP TABLE users, rm -rf /, password=abcdefghijklmnopqrst");
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_detail_names_findings() {
        let snapshot = EvaluationSnapshot::new("t", "git push --force to main", Complexity::Low);
        let result = SafetyEvaluator::new().evaluate(&snapshot);
        assert!(result.detail.contains("force push"));
        assert!(!result.degraded);
    }
}
