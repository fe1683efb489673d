//! Backend selection.
//!
//! Order of precedence:
//! 1. A forced backend from the request context (confidence 1.0)
//! 2. The fastest local backend, unless top quality is required (confidence 0.9)
//! 3. The best weighted candidate score (confidence = that score)
//!
//! The weighted score is
//! `w_q · tier/max_tier + w_l · min_latency/latency + w_c · min_cost/cost`,
//! which keeps the ordering of `1/latency` and `1/cost` while bounding each
//! term to [0, 1]. Every other candidate, best first, forms the fallback chain.

use serde::{Deserialize, Serialize};

use arbiter_core::config::{BackendSpec, RoutingWeights};
use arbiter_core::Request;

use crate::providers::GenerateOptions;

/// Confidence reported for a forced backend.
pub const FORCED_CONFIDENCE: f64 = 1.0;

/// Confidence reported for the local shortcut.
pub const LOCAL_CONFIDENCE: f64 = 0.9;

/// Which backend runs a step, and where to go if it fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_provider: String,
    pub selected_model: String,

    /// Remaining candidates, best first. Never contains `selected_provider`.
    pub fallback_chain: Vec<String>,

    pub confidence: f64,
    pub reasoning: String,
}

impl RoutingDecision {
    /// Selected backend followed by the fallback chain.
    pub fn attempt_order(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.selected_provider.as_str())
            .chain(self.fallback_chain.iter().map(String::as_str))
    }
}

/// Per-call routing inputs.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub trace_id: String,

    /// Backend the caller insists on
    pub forced_backend: Option<String>,

    /// Disables the local shortcut
    pub require_top_quality: bool,

    pub options: GenerateOptions,

    /// Read and write the response cache
    pub use_cache: bool,
}

impl RoutingContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            forced_backend: None,
            require_top_quality: false,
            options: GenerateOptions::default(),
            use_cache: true,
        }
    }

    /// Routing inputs carried by a request's flags.
    pub fn for_request(request: &Request, trace_id: impl Into<String>) -> Self {
        Self {
            forced_backend: request.flags.forced_backend.clone(),
            require_top_quality: request.flags.require_top_quality,
            ..Self::new(trace_id)
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.forced_backend = Some(backend.into());
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn top_quality(mut self) -> Self {
        self.require_top_quality = true;
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Weighted score of every candidate, best first.
///
/// Ties keep configuration order.
pub fn rank<'a>(candidates: &[&'a BackendSpec], weights: &RoutingWeights) -> Vec<(&'a BackendSpec, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let max_tier = candidates.iter().map(|b| b.quality_tier).max().unwrap_or(1).max(1) as f64;
    let min_latency = candidates.iter().map(|b| b.latency_ms.max(1)).min().unwrap_or(1) as f64;
    let min_cost = candidates
        .iter()
        .map(|b| b.cost_per_1k_tokens)
        .fold(f64::INFINITY, f64::min);

    let mut scored: Vec<(&BackendSpec, f64)> = candidates
        .iter()
        .map(|spec| {
            let quality = spec.quality_tier as f64 / max_tier;
            let latency = min_latency / spec.latency_ms.max(1) as f64;
            let cost = if spec.cost_per_1k_tokens > 0.0 {
                min_cost / spec.cost_per_1k_tokens
            } else {
                1.0
            };
            let score = weights.quality * quality + weights.latency * latency + weights.cost * cost;
            (*spec, score.clamp(0.0, 1.0))
        })
        .collect();

    // Stable sort keeps configuration order on ties
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

/// Pick a backend from the pool.
///
/// `is_open` reports backends with an open circuit; they are skipped unless
/// every backend is open. Returns `None` only for an empty pool.
pub fn select(
    pool: &[BackendSpec],
    weights: &RoutingWeights,
    context: &RoutingContext,
    is_open: impl Fn(&str) -> bool,
) -> Option<RoutingDecision> {
    if pool.is_empty() {
        return None;
    }

    let healthy: Vec<&BackendSpec> = pool.iter().filter(|b| !is_open(&b.name)).collect();
    let mut skipped_note = String::new();
    let candidates: Vec<&BackendSpec> = if healthy.is_empty() {
        skipped_note.push_str(" (every circuit open; trying all backends)");
        pool.iter().collect()
    } else {
        if healthy.len() < pool.len() {
            skipped_note = format!(" ({} backend(s) skipped: circuit open)", pool.len() - healthy.len());
        }
        healthy
    };

    let ranked = rank(&candidates, weights);

    let chain_without = |name: &str| -> Vec<String> {
        ranked
            .iter()
            .filter(|(spec, _)| spec.name != name)
            .map(|(spec, _)| spec.name.clone())
            .collect()
    };

    // 1. Forced backend
    if let Some(forced) = context.forced_backend.as_deref() {
        if let Some(spec) = pool.iter().find(|b| b.name == forced) {
            return Some(RoutingDecision {
                selected_provider: spec.name.clone(),
                selected_model: spec.model.clone(),
                fallback_chain: chain_without(&spec.name),
                confidence: FORCED_CONFIDENCE,
                reasoning: format!("backend '{}' requested explicitly{}", spec.name, skipped_note),
            });
        }
        tracing::warn!(
            trace_id = %context.trace_id,
            backend = forced,
            "Requested backend is not configured, ranking instead"
        );
    }

    // 2. Local shortcut
    if !context.require_top_quality {
        let local = candidates
            .iter()
            .filter(|b| b.local)
            .min_by_key(|b| b.latency_ms);
        if let Some(spec) = local {
            return Some(RoutingDecision {
                selected_provider: spec.name.clone(),
                selected_model: spec.model.clone(),
                fallback_chain: chain_without(&spec.name),
                confidence: LOCAL_CONFIDENCE,
                reasoning: format!(
                    "local backend '{}' ({}ms) preferred; top quality not required{}",
                    spec.name, spec.latency_ms, skipped_note
                ),
            });
        }
    }

    // 3. Weighted score
    let (best, score) = ranked.first()?;
    Some(RoutingDecision {
        selected_provider: best.name.clone(),
        selected_model: best.model.clone(),
        fallback_chain: chain_without(&best.name),
        confidence: *score,
        reasoning: format!(
            "highest weighted score {:.3} (tier {}, {}ms, cost {}){}",
            score, best.quality_tier, best.latency_ms, best.cost_per_1k_tokens, skipped_note
        ),
    })
}
