//! Core data model for Arbiter.
//!
//! Everything in this module is plain data: requests, complexity tiers,
//! admission dimensions, evaluator results and the admission score.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while turning an invocation into a [`Request`].
///
/// These are validation errors: they are never retried and are reported
/// to the caller immediately.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("Request text is empty")]
    EmptyInput,

    #[error("Request text is {len} characters, limit is {max}")]
    InputTooLong { len: usize, max: usize },

    #[error("Invalid value '{value}' for context key '{key}'")]
    InvalidFlag { key: String, value: String },
}

/// How much deliberation a request receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Numeric rank: Low = 0, Medium = 1, High = 2.
    pub fn rank(self) -> u8 {
        match self {
            Complexity::Low => 0,
            Complexity::Medium => 1,
            Complexity::High => 2,
        }
    }

    /// Inverse of [`Complexity::rank`]; anything above 2 saturates to High.
    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 => Complexity::Low,
            1 => Complexity::Medium,
            _ => Complexity::High,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Complexity::Low),
            "medium" => Ok(Complexity::Medium),
            "high" => Ok(Complexity::High),
            _ => Err(RequestError::InvalidFlag {
                key: "complexity".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// The fixed set of admission dimensions.
///
/// Each dimension has exactly one specialist evaluator. `Safety` doubles as
/// the risk dimension: `risk = 1 - safety`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Correctness,
    Safety,
    Efficiency,
    Maintainability,
    Beauty,
}

impl Dimension {
    /// All dimensions in weight-vector order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Correctness,
        Dimension::Safety,
        Dimension::Efficiency,
        Dimension::Maintainability,
        Dimension::Beauty,
    ];

    /// Position of this dimension in weight and score vectors.
    pub fn index(self) -> usize {
        match self {
            Dimension::Correctness => 0,
            Dimension::Safety => 1,
            Dimension::Efficiency => 2,
            Dimension::Maintainability => 3,
            Dimension::Beauty => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Correctness => "correctness",
            Dimension::Safety => "safety",
            Dimension::Efficiency => "efficiency",
            Dimension::Maintainability => "maintainability",
            Dimension::Beauty => "beauty",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown dimension: '{}'", s))
    }
}

/// Per-request flags carried in the invocation context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFlags {
    /// Backend the caller insists on.
    pub forced_backend: Option<String>,

    /// Run the canary path as the primary path.
    pub canary_override: bool,

    /// Explicit shadow sampling decision. `None` defers to the sample rate.
    pub shadow: Option<bool>,

    /// Caller demands the top quality tier (disables the local shortcut).
    pub require_top_quality: bool,
}

/// An incoming task request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub raw_text: String,
    pub complexity: Option<Complexity>,
    pub flags: RequestFlags,
}

impl Request {
    /// Create a request with a generated id and no flags.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw_text: raw_text.into(),
            complexity: None,
            flags: RequestFlags::default(),
        }
    }

    /// Build a request from an `invoke(command, context)` call.
    ///
    /// Recognised context keys: `request_id`, `complexity`, `backend`,
    /// `canary`, `shadow`, `require_top_quality`. Unknown keys are ignored.
    pub fn from_invocation(
        command: &str,
        context: &HashMap<String, String>,
        max_input_chars: usize,
    ) -> Result<Self, RequestError> {
        let text = command.trim();
        if text.is_empty() {
            return Err(RequestError::EmptyInput);
        }
        let len = text.chars().count();
        if len > max_input_chars {
            return Err(RequestError::InputTooLong {
                len,
                max: max_input_chars,
            });
        }

        let complexity = context
            .get("complexity")
            .map(|v| v.parse::<Complexity>())
            .transpose()?;

        let forced_backend = context
            .get("backend")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let flags = RequestFlags {
            forced_backend,
            canary_override: parse_bool(context, "canary")?.unwrap_or(false),
            shadow: parse_bool(context, "shadow")?,
            require_top_quality: parse_bool(context, "require_top_quality")?.unwrap_or(false),
        };

        let id = context
            .get("request_id")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            id,
            raw_text: text.to_string(),
            complexity,
            flags,
        })
    }

    /// Same request with a fresh id, used for shadow runs.
    pub fn fork(&self) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ..self.clone()
        }
    }
}

fn parse_bool(context: &HashMap<String, String>, key: &str) -> Result<Option<bool>, RequestError> {
    match context.get(key) {
        None => Ok(None),
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(RequestError::InvalidFlag {
                key: key.to_string(),
                value: v.clone(),
            }),
        },
    }
}

/// Output of one evaluator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorResult {
    /// The dimension this evaluator scores
    pub name: Dimension,

    /// Bounded score in [0, 1]
    pub score: f64,

    /// Human-readable detail
    pub detail: String,

    /// Wall-clock duration of the evaluator call
    pub duration_ms: u64,

    /// True when the score is a neutral fallback rather than a real verdict
    #[serde(default)]
    pub degraded: bool,
}

impl EvaluatorResult {
    /// Create a result; the score is clamped into [0, 1] and NaN becomes 0.
    pub fn new(name: Dimension, score: f64, detail: impl Into<String>) -> Self {
        Self {
            name,
            score: clamp_unit(score),
            detail: detail.into(),
            duration_ms: 0,
            degraded: false,
        }
    }

    /// A neutral stand-in for an evaluator that failed or timed out.
    pub fn neutral(name: Dimension, score: f64, reason: impl Into<String>) -> Self {
        Self {
            degraded: true,
            ..Self::new(name, score, reason)
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Clamp into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Immutable view handed to every evaluator in a fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSnapshot {
    pub request_id: String,
    pub input: String,
    pub complexity: Complexity,

    /// Evaluator outputs already merged before this fan-out
    pub prior: BTreeMap<Dimension, EvaluatorResult>,
}

impl EvaluationSnapshot {
    pub fn new(request_id: impl Into<String>, input: impl Into<String>, complexity: Complexity) -> Self {
        Self {
            request_id: request_id.into(),
            input: input.into(),
            complexity,
            prior: BTreeMap::new(),
        }
    }
}

/// Ternary admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionDecision {
    AutoRun,
    AskOperator,
    Block,
}

impl AdmissionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionDecision::AutoRun => "AUTO_RUN",
            AdmissionDecision::AskOperator => "ASK_OPERATOR",
            AdmissionDecision::Block => "BLOCK",
        }
    }
}

impl fmt::Display for AdmissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-size score vector indexed by [`Dimension::index`].
///
/// A slot is `None` when the dimension was not evaluated at the run's tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores([Option<f64>; 5]);

impl DimensionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dimension set to the same score.
    pub fn uniform(score: f64) -> Self {
        Self([Some(clamp_unit(score)); 5])
    }

    pub fn get(&self, dimension: Dimension) -> Option<f64> {
        self.0[dimension.index()]
    }

    pub fn set(&mut self, dimension: Dimension, score: f64) {
        self.0[dimension.index()] = Some(clamp_unit(score));
    }

    pub fn with(mut self, dimension: Dimension, score: f64) -> Self {
        self.set(dimension, score);
        self
    }

    /// Evaluated dimensions with their scores, in weight-vector order.
    pub fn evaluated(&self) -> impl Iterator<Item = (Dimension, f64)> + '_ {
        Dimension::ALL
            .into_iter()
            .filter_map(|d| self.get(d).map(|s| (d, s)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl<'a> FromIterator<&'a EvaluatorResult> for DimensionScores {
    fn from_iter<I: IntoIterator<Item = &'a EvaluatorResult>>(iter: I) -> Self {
        let mut scores = DimensionScores::new();
        for result in iter {
            scores.set(result.name, result.score);
        }
        scores
    }
}

/// The admission verdict for one run. Read-only once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionScore {
    pub dimension_scores: DimensionScores,
    pub composite: f64,
    pub risk: f64,
    pub spread: f64,

    /// Passing composite hiding a wide spread between dimensions
    pub lucky_average: bool,

    pub decision: AdmissionDecision,

    /// Dimension whose floor breach forced a BLOCK
    pub blocked_by: Option<Dimension>,
}
