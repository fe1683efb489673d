//! Configuration for Arbiter.
//!
//! A single YAML document configures scoring, classification, evaluators,
//! routing, execution and shadow comparison. Documents are validated against
//! JSON Schema first and then checked semantically (weights summing to one,
//! tier plan shape, backend references).

mod parser;
mod schema;

pub use parser::ConfigError;
pub use schema::validate_config_schema;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::{Complexity, Dimension};

/// Tolerance used when checking that a weight vector sums to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArbiterConfig {
    #[serde(default)]
    pub admission: AdmissionConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub evaluators: EvaluatorsConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub shadow: ShadowConfig,

    /// Directory for shadow diffs and routing history. `None` disables persistence.
    #[serde(default)]
    pub evidence_dir: Option<PathBuf>,
}

/// Weights of the five admission dimensions. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub correctness: f64,
    pub safety: f64,
    pub efficiency: f64,
    pub maintainability: f64,
    pub beauty: f64,
}

impl DimensionWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Correctness => self.correctness,
            Dimension::Safety => self.safety,
            Dimension::Efficiency => self.efficiency,
            Dimension::Maintainability => self.maintainability,
            Dimension::Beauty => self.beauty,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            correctness: 0.30,
            safety: 0.25,
            efficiency: 0.15,
            maintainability: 0.15,
            beauty: 0.15,
        }
    }
}

/// Admission scorer thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub weights: DimensionWeights,

    /// Minimum composite for AUTO_RUN
    pub admission_threshold: f64,

    /// Maximum risk (1 - safety) for AUTO_RUN
    pub risk_threshold: f64,

    /// Safety below this floor is an immediate BLOCK
    pub hard_block_floor: f64,

    /// Spread above this on a passing run is flagged as a lucky average
    pub spread_alert: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            weights: DimensionWeights::default(),
            admission_threshold: 0.90,
            risk_threshold: 0.10,
            hard_block_floor: 0.20,
            spread_alert: 0.40,
        }
    }
}

/// Keyword/length complexity classifier settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Inputs shorter than this (in characters) rank Low on length
    pub low_max_chars: usize,

    /// Inputs shorter than this rank Medium on length; longer rank High
    pub medium_max_chars: usize,

    /// Any of these words ranks the input High on keywords
    pub high_keywords: Vec<String>,

    /// Any of these words ranks the input Medium on keywords
    pub medium_keywords: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            low_max_chars: 80,
            medium_max_chars: 400,
            high_keywords: words(&[
                "architecture",
                "concurrency",
                "distributed",
                "migration",
                "production",
                "refactor",
                "security",
                "deploy",
            ]),
            medium_keywords: words(&[
                "analyze",
                "debug",
                "implement",
                "integrate",
                "optimize",
                "review",
                "test",
            ]),
        }
    }
}

/// Which evaluator dimensions run at each complexity tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPlan {
    pub low: Vec<Dimension>,
    pub medium: Vec<Dimension>,
    pub high: Vec<Dimension>,
}

impl TierPlan {
    pub fn for_complexity(&self, complexity: Complexity) -> &[Dimension] {
        match complexity {
            Complexity::Low => &self.low,
            Complexity::Medium => &self.medium,
            Complexity::High => &self.high,
        }
    }
}

impl Default for TierPlan {
    fn default() -> Self {
        Self {
            low: vec![Dimension::Safety],
            medium: vec![Dimension::Safety, Dimension::Correctness],
            high: Dimension::ALL.to_vec(),
        }
    }
}

/// How an evaluator computes its score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// Deterministic pattern heuristic
    #[default]
    Heuristic,

    /// Ask a backend through the provider router
    LlmJudge,
}

/// Evaluator fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorsConfig {
    pub tiers: TierPlan,

    /// Score substituted for a failed or timed-out evaluator
    pub default_neutral: f64,

    /// Per-dimension overrides of `default_neutral`
    pub neutral_scores: BTreeMap<Dimension, f64>,

    /// Per-evaluator timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Evaluator implementation per dimension (heuristic when absent)
    pub kinds: BTreeMap<Dimension, EvaluatorKind>,
}

impl EvaluatorsConfig {
    pub fn neutral_score(&self, dimension: Dimension) -> f64 {
        self.neutral_scores
            .get(&dimension)
            .copied()
            .unwrap_or(self.default_neutral)
    }

    pub fn kind(&self, dimension: Dimension) -> EvaluatorKind {
        self.kinds.get(&dimension).copied().unwrap_or_default()
    }
}

impl Default for EvaluatorsConfig {
    fn default() -> Self {
        Self {
            tiers: TierPlan::default(),
            default_neutral: 0.5,
            neutral_scores: BTreeMap::new(),
            timeout: Duration::from_secs(10),
            kinds: BTreeMap::new(),
        }
    }
}

/// Weights for the candidate scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingWeights {
    pub quality: f64,
    pub latency: f64,
    pub cost: f64,
}

impl RoutingWeights {
    pub fn sum(&self) -> f64 {
        self.quality + self.latency + self.cost
    }
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            quality: 0.4,
            latency: 0.3,
            cost: 0.3,
        }
    }
}

/// One backend in the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Unique name used in routing decisions and the `backend` context key
    pub name: String,

    /// Adapter kind: `echo`, `anthropic`, `openai` or `local`
    pub kind: String,

    /// Model requested from the backend
    pub model: String,

    #[serde(default)]
    pub endpoint: Option<String>,

    /// Name resolved through the secret provider (never the secret itself)
    #[serde(default)]
    pub credential_ref: Option<String>,

    /// Higher is better; 1 is the lowest tier
    #[serde(default = "default_quality_tier")]
    pub quality_tier: u8,

    /// Typical latency estimate
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Relative cost estimate per 1k tokens
    #[serde(default = "default_cost")]
    pub cost_per_1k_tokens: f64,

    /// Low-latency local backend eligible for the local shortcut
    #[serde(default)]
    pub local: bool,

    #[serde(default = "default_backend_timeout", with = "humantime_duration")]
    pub timeout: Duration,
}

fn default_quality_tier() -> u8 {
    1
}

fn default_latency_ms() -> u64 {
    1000
}

fn default_cost() -> f64 {
    1.0
}

fn default_backend_timeout() -> Duration {
    Duration::from_secs(15)
}

impl BackendSpec {
    /// A local echo backend, used by the default configuration.
    pub fn echo(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "echo".to_string(),
            model: "echo".to_string(),
            endpoint: None,
            credential_ref: None,
            quality_tier: 1,
            latency_ms: 1,
            cost_per_1k_tokens: 0.001,
            local: true,
            timeout: default_backend_timeout(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,

    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

/// Per-backend retry before falling down the chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries_per_backend: usize,

    #[serde(with = "humantime_duration")]
    pub base_delay: Duration,

    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries_per_backend: 0,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "humantime_duration")]
    pub recovery_timeout: Duration,

    /// Successes needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Provider router settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub weights: RoutingWeights,
    pub backends: Vec<BackendSpec>,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,

    /// Routing records retained in memory
    pub history_capacity: usize,
}

impl RouterConfig {
    pub fn backend(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.iter().find(|b| b.name == name)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            weights: RoutingWeights::default(),
            backends: vec![BackendSpec::echo("local-echo")],
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            history_capacity: 1024,
        }
    }
}

/// EXECUTE node settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    pub max_input_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_input_chars: 20_000,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// Shadow/canary comparison settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub enabled: bool,

    /// Fraction of unflagged calls that get a shadow run
    pub sample_rate: f64,

    /// Backend the canary path is pinned to
    pub canary_backend: Option<String>,

    /// Upper bound on a shadow run before it is abandoned
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 0.0,
            canary_backend: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Serde helpers for human-readable durations ("250ms", "10s", "1h").
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
