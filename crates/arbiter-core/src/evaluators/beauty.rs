//! Beauty evaluator
//!
//! **Question**: Is the request clear and well-formed?
//!
//! Shouting, punctuation runs and doubled filler read as noise.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::{Evaluator, ScoreSheet};

lazy_static! {
    static ref PUNCTUATION_RUN: Regex = Regex::new(r"[!?]{2,}").unwrap();
    static ref DOUBLED_WORD: Regex = Regex::new(r"(?i)\b(etc|very|really|please)\W+(etc|very|really|please)\b").unwrap();
}

const BASE_SCORE: f64 = 0.9;

/// The beauty evaluator.
pub struct BeautyEvaluator;

impl BeautyEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BeautyEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn uppercase_ratio(input: &str) -> f64 {
    let letters: Vec<char> = input.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 10 {
        return 0.0;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64
}

impl Evaluator for BeautyEvaluator {
    fn dimension(&self) -> Dimension {
        Dimension::Beauty
    }

    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult {
        let input = &snapshot.input;
        let mut sheet = ScoreSheet::new(self.dimension(), BASE_SCORE);

        let ratio = uppercase_ratio(input);
        if ratio > 0.6 {
            sheet.adjust(-0.2, format!("{:.0}% uppercase", ratio * 100.0));
        }

        let runs = PUNCTUATION_RUN.find_iter(input).count();
        if runs > 0 {
            sheet.adjust(-0.05 * runs.min(4) as f64, "punctuation runs");
        }

        if DOUBLED_WORD.is_match(input) {
            sheet.adjust(-0.1, "doubled filler");
        }

        if input.trim_end().ends_with(['.', '?']) {
            sheet.adjust(0.05, "complete sentence");
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
        BeautyEvaluator::new().evaluate(&snapshot).score
    }

    #[test]
    fn test_clean_sentence() {
        assert!((score("Describe the retry policy.") - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_shouting_penalized() {
        assert!(score("FIX THE BUILD NOW!!!! PLEASE!!!") < 0.7);
    }

    #[test]
    fn test_uppercase_ratio_ignores_short_inputs() {
        assert_eq!(uppercase_ratio("OK"), 0.0);
    }
}
