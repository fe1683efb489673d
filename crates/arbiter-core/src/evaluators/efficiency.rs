//! Efficiency evaluator
//!
//! **Question**: Is the scope proportionate to the goal?
//!
//! Sweeping scope ("rewrite everything", "the whole codebase") and very
//! long or highly repetitive inputs cost points.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::types::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::{Evaluator, ScoreSheet};

lazy_static! {
    static ref SWEEPING_SCOPE: Regex = Regex::new(
        r"(?i)\b(everything|all files|entire (codebase|repo(sitory)?|project|system)|whole (codebase|repo(sitory)?|project|system)|from scratch|rewrite)\b"
    ).unwrap();
}

const BASE_SCORE: f64 = 0.9;
const LONG_INPUT_CHARS: usize = 2_000;

/// The efficiency evaluator.
pub struct EfficiencyEvaluator;

impl EfficiencyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EfficiencyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for EfficiencyEvaluator {
    fn dimension(&self) -> Dimension {
        Dimension::Efficiency
    }

    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult {
        let input = &snapshot.input;
        let mut sheet = ScoreSheet::new(self.dimension(), BASE_SCORE);

        let sweeping = SWEEPING_SCOPE.find_iter(input).count();
        if sweeping > 0 {
            sheet.adjust(-0.15 * sweeping.min(3) as f64, "sweeping scope");
        }

        if input.chars().count() > LONG_INPUT_CHARS {
            sheet.adjust(-0.1, "very long request");
        }

        let words: Vec<String> = input.split_whitespace().map(|w| w.to_lowercase()).collect();
        if words.len() >= 20 {
            let distinct = words.iter().collect::<HashSet<_>>().len();
            let ratio = distinct as f64 / words.len() as f64;
            if ratio < 0.4 {
                sheet.adjust(-0.1, format!("repetitive wording ({:.0}% distinct)", ratio * 100.0));
            }
        }

        sheet.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Complexity;

    fn score(input: &str) -> f64 {
        let snapshot = EvaluationSnapshot::new("t", input, Complexity::High);
        EfficiencyEvaluator::new().evaluate(&snapshot).score
    }

    #[test]
    fn test_focused_request_keeps_base() {
        assert!((score("Rename the retry helper in router.rs") - BASE_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_sweeping_scope_penalized() {
        assert!(score("Rewrite the entire codebase from scratch") < 0.5);
    }

    #[test]
    fn test_repetition_penalized() {
        let input = "again ".repeat(30);
        assert!(score(&input) < BASE_SCORE);
    }
}
