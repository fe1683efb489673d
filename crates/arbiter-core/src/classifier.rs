//! Complexity classification.
//!
//! The classifier decides how wide the evaluator fan-out is. The default
//! [`KeywordClassifier`] combines two signals:
//!
//! | Signal | Rank 0 (Low) | Rank 1 (Medium) | Rank 2 (High) |
//! |--------|--------------|-----------------|---------------|
//! | Length | `< low_max_chars` | `< medium_max_chars` | otherwise |
//! | Keywords | none | any medium keyword | any high keyword |
//!
//! The two ranks are averaged and floored, so a tie between adjacent tiers
//! lands on the lower one.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ClassifierConfig;
use crate::types::Complexity;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[A-Za-z][A-Za-z0-9_-]*").unwrap();
}

/// Anything that can assign a complexity tier to raw input.
///
/// Swapping in a learned classifier does not change graph topology.
pub trait ComplexityClassifier: Send + Sync {
    fn classify(&self, input: &str) -> Complexity;

    /// Name for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Length + keyword heuristic classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    config: ClassifierConfig,
    high: Vec<String>,
    medium: Vec<String>,
}

impl KeywordClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let lower = |list: &[String]| list.iter().map(|k| k.to_lowercase()).collect();
        Self {
            high: lower(&config.high_keywords),
            medium: lower(&config.medium_keywords),
            config,
        }
    }

    fn length_rank(&self, input: &str) -> u8 {
        let len = input.chars().count();
        if len < self.config.low_max_chars {
            0
        } else if len < self.config.medium_max_chars {
            1
        } else {
            2
        }
    }

    fn keyword_rank(&self, input: &str) -> u8 {
        let mut rank = 0;
        for word in WORD.find_iter(input) {
            let word = word.as_str().to_lowercase();
            if self.high.iter().any(|k| word.starts_with(k.as_str())) {
                return 2;
            }
            if self.medium.iter().any(|k| word.starts_with(k.as_str())) {
                rank = 1;
            }
        }
        rank
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl ComplexityClassifier for KeywordClassifier {
    fn classify(&self, input: &str) -> Complexity {
        let length = self.length_rank(input);
        let keywords = self.keyword_rank(input);
        let combined = (length + keywords) / 2;

        tracing::debug!(length, keywords, combined, "Classified request complexity");

        Complexity::from_rank(combined)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Always returns the same tier. Useful for pinning a deployment.
#[derive(Debug, Clone, Copy)]
pub struct FixedClassifier(pub Complexity);

impl ComplexityClassifier for FixedClassifier {
    fn classify(&self, _input: &str) -> Complexity {
        self.0
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
