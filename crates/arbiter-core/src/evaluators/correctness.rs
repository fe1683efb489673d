//! Correctness evaluator
//!
//! **Question**: Is the request specific enough to get right?
//!
//! Concrete anchors (file paths, identifiers, quoted values, numbers) raise
//! the score. Vague filler and near-empty requests lower it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::{Evaluator, ScoreSheet};

lazy_static! {
    static ref PATH_OR_FILE: Regex = Regex::new(r"[\w./-]+\.[A-Za-z]{1,5}\b|\b\w+/\w+").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"`[^`]+`|\b[a-z]+_[a-z0-9_]+\b|\b\w+::\w+|\b[a-z]+[A-Z]\w*\(").unwrap();
    static ref QUOTED_OR_NUMERIC: Regex = Regex::new(r#""[^"]+"|'[^']+'|\b\d+(\.\d+)?\b"#).unwrap();
    static ref VAGUE: Regex = Regex::new(
        r"(?i)\b(somehow|something|whatever|stuff|things|etc|some kind of|kind of|sort of|make it better|fix it)\b"
    ).unwrap();
}

const BASE_SCORE: f64 = 0.85;
const MAX_VAGUE_PENALTY: f64 = 0.3;

/// The correctness evaluator.
pub struct CorrectnessEvaluator;

impl CorrectnessEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CorrectnessEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for CorrectnessEvaluator {
    fn dimension(&self) -> Dimension {
        Dimension::Correctness
    }

    fn evaluate(&self, snapshot: &EvaluationSnapshot) -> EvaluatorResult {
        let input = &snapshot.input;
        let mut sheet = ScoreSheet::new(self.dimension(), BASE_SCORE);

        let words = input.split_whitespace().count();
        if words < 3 {
            sheet.adjust(-0.2, "too short to pin down intent");
        }

        if PATH_OR_FILE.is_match(input) {
            sheet.adjust(0.05, "names a file or path");
        }
        if IDENTIFIER.is_match(input) {
            sheet.adjust(0.05, "names a code identifier");
        }
        if QUOTED_OR_NUMERIC.is_match(input) {
            sheet.adjust(0.03, "states a concrete value");
        }

        let vague = VAGUE.find_iter(input).count();
        if vague > 0 {
            let penalty = (vague as f64 * 0.1).min(MAX_VAGUE_PENALTY);
            sheet.adjust(-penalty, format!("{} vague phrase(s)", vague));
        }

        sheet.finish()
    }
}
