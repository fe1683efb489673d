//! Maintainability evaluator
//!
//! **Question**: Will the result be sustainable to own?

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::{Evaluator, ScoreSheet};

lazy_static! {
    static ref SHORTCUTS: Regex = Regex::new(
        r"(?i)\b(hack(y)?|quick (and dirty|fix)|temporary|hard-?code(d)?|copy[- ]?paste|monkey[- ]?patch|just make it work|ignore (the )?(warnings?|errors?)|no tests?)\b"
    ).unwrap();
    static ref CARE: Regex = Regex::new(
        r"(?i)\b(tests?|document(ation)?|docs?|typed|types|backward[s]?[- ]compatible|deprecat(e|ion))\b"
    ).unwrap();
}

const BASE_SCORE: f64 = 0.85;

/// The maintainability evaluator.
pub struct MaintainabilityEvaluator;

impl MaintainabilityEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MaintainabilityEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for MaintainabilityEvaluator {
    fn dimension(&self) -> Dimension {
        Dimension::Maintainability
    }

    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult {
        let input = &snapshot.input;
        let mut sheet = ScoreSheet::new(self.dimension(), BASE_SCORE);

        for shortcut in SHORTCUTS.find_iter(input).take(3) {
            sheet.adjust(-0.15, format!("shortcut: '{}'", shortcut.as_str()));
        }

        if CARE.is_match(input) {
            sheet.adjust(0.1, "asks for tests, docs or types");
        }

        sheet.finish()
    }
}
