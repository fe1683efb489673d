//! Admission scorer: recombines evaluator scores into a single verdict.
//!
//! The scorer applies a fixed policy:
//! 1. If safety is below the hard-block floor → BLOCK, regardless of composite
//! 2. Else if composite ≥ admission threshold AND risk ≤ risk threshold → AUTO_RUN
//! 3. Else → ASK_OPERATOR
//!
//! `composite` is the weighted sum of the evaluated dimensions. When a tier
//! evaluated only a subset, the weights of that subset are renormalized so
//! they sum to one. `risk = 1 - safety`.
//!
//! The scorer is pure: the same scores and config always produce the same
//! [`AdmissionScore`].

use crate::config::AdmissionConfig;
use crate::types::{
    clamp_unit, AdmissionDecision, AdmissionScore, Dimension, DimensionScores, EvaluatorResult,
};

/// The AdmissionScorer turns dimension scores into an admission decision.
#[derive(Debug, Clone, Default)]
pub struct AdmissionScorer {
    config: AdmissionConfig,
}

impl AdmissionScorer {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Score a set of evaluator results.
    pub fn score<'a, I>(&self, results: I) -> AdmissionScore
    where
        I: IntoIterator<Item = &'a EvaluatorResult>,
    {
        let scores: DimensionScores = results.into_iter().collect();
        self.score_dimensions(&scores)
    }

    /// Score a dimension vector.
    pub fn score_dimensions(&self, scores: &DimensionScores) -> AdmissionScore {
        let composite = self.composite(scores);
        let safety = scores.get(Dimension::Safety);
        let risk = safety.map(|s| clamp_unit(1.0 - s)).unwrap_or(1.0);
        let spread = spread(scores);
        let (decision, blocked_by) = self.decide(composite, safety);
        let lucky_average =
            decision == AdmissionDecision::AutoRun && spread > self.config.spread_alert;

        if lucky_average {
            tracing::warn!(composite, spread, "Passing composite hides a wide spread");
        }

        AdmissionScore {
            dimension_scores: *scores,
            composite,
            risk,
            spread,
            lucky_average,
            decision,
            blocked_by,
        }
    }

    /// Weighted composite over the evaluated dimensions.
    ///
    /// Returns 0.0 when nothing was evaluated.
    pub fn composite(&self, scores: &DimensionScores) -> f64 {
        let weights = &self.config.weights;
        let (weighted, total_weight, count, plain) = scores.evaluated().fold(
            (0.0, 0.0, 0usize, 0.0),
            |(weighted, total, count, plain), (dimension, score)| {
                let w = weights.get(dimension);
                (weighted + w * score, total + w, count + 1, plain + score)
            },
        );

        if count == 0 {
            return 0.0;
        }

        // All evaluated dimensions carry zero weight: fall back to the mean
        if total_weight <= f64::EPSILON {
            return clamp_unit(plain / count as f64);
        }

        clamp_unit(weighted / total_weight)
    }

    /// Apply the decision policy.
    ///
    /// `safety` is `None` when the tier did not evaluate safety. Without a
    /// safety score there is no floor to breach, but risk is treated as 1.0,
    /// so AUTO_RUN is unreachable.
    pub fn decide(
        &self,
        composite: f64,
        safety: Option<f64>,
    ) -> (AdmissionDecision, Option<Dimension>) {
        let config = &self.config;

        if let Some(safety) = safety {
            if safety < config.hard_block_floor {
                return (AdmissionDecision::Block, Some(Dimension::Safety));
            }
        }

        let risk = safety.map(|s| 1.0 - s).unwrap_or(1.0);
        if composite >= config.admission_threshold && risk <= config.risk_threshold {
            (AdmissionDecision::AutoRun, None)
        } else {
            (AdmissionDecision::AskOperator, None)
        }
    }
}

/// `max - min` over the evaluated scores; 0.0 for fewer than two.
pub fn spread(scores: &DimensionScores) -> f64 {
    let mut iter = scores.evaluated().map(|(_, s)| s);
    let Some(first) = iter.next() else {
        return 0.0;
    };
    let (min, max) = iter.fold((first, first), |(min, max), s| (min.min(s), max.max(s)));
    max - min
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scorer() -> AdmissionScorer {
        AdmissionScorer::default()
    }

    #[test]
    fn test_full_run_is_exact_weighted_sum() {
        let scores = DimensionScores::new()
            .with(Dimension::Correctness, 1.0)
            .with(Dimension::Safety, 0.8)
            .with(Dimension::Efficiency, 0.6)
            .with(Dimension::Maintainability, 0.4)
            .with(Dimension::Beauty, 0.2);

        let expected = 0.30 * 1.0 + 0.25 * 0.8 + 0.15 * 0.6 + 0.15 * 0.4 + 0.15 * 0.2;
        assert!((scorer().composite(&scores) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_subset_weights_are_renormalized() {
        // Medium tier: safety 0.25 and correctness 0.30 renormalize to 5/11 and 6/11
        let scores = DimensionScores::new()
            .with(Dimension::Safety, 1.0)
            .with(Dimension::Correctness, 0.0);
        let expected = 0.25 / 0.55;
        assert!((scorer().composite(&scores) - expected).abs() < 1e-9);

        // Low tier: a single dimension's composite is its own score
        let only_safety = DimensionScores::new().with(Dimension::Safety, 0.93);
        assert!((scorer().composite(&only_safety) - 0.93).abs() < 1e-9);
    }

    #[test]
    fn test_auto_run_when_composite_and_risk_pass() {
        let (decision, blocked_by) = scorer().decide(0.95, Some(0.95));
        assert_eq!(decision, AdmissionDecision::AutoRun);
        assert_eq!(blocked_by, None);
    }

    #[test]
    fn test_ask_operator_when_risk_too_high() {
        // risk 0.20 > 0.10
        let (decision, _) = scorer().decide(0.95, Some(0.80));
        assert_eq!(decision, AdmissionDecision::AskOperator);
    }

    #[test]
    fn test_ask_operator_when_composite_too_low() {
        let (decision, _) = scorer().decide(0.89, Some(1.0));
        assert_eq!(decision, AdmissionDecision::AskOperator);
    }

    #[test]
    fn test_block_below_safety_floor_regardless_of_composite() {
        let (decision, blocked_by) = scorer().decide(1.0, Some(0.0));
        assert_eq!(decision, AdmissionDecision::Block);
        assert_eq!(blocked_by, Some(Dimension::Safety));
    }

    #[test]
    fn test_safety_exactly_at_floor_is_not_blocked() {
        let (decision, _) = scorer().decide(0.5, Some(0.2));
        assert_eq!(decision, AdmissionDecision::AskOperator);
    }

    #[test]
    fn test_missing_safety_never_auto_runs() {
        let (decision, _) = scorer().decide(1.0, None);
        assert_eq!(decision, AdmissionDecision::AskOperator);
    }

    #[test]
    fn test_lucky_average_flagged_on_wide_spread() {
        let mut config = AdmissionConfig::default();
        config.admission_threshold = 0.5;
        config.risk_threshold = 0.5;
        let scorer = AdmissionScorer::new(config);

        let scores = DimensionScores::new()
            .with(Dimension::Correctness, 1.0)
            .with(Dimension::Safety, 1.0)
            .with(Dimension::Efficiency, 1.0)
            .with(Dimension::Maintainability, 1.0)
            .with(Dimension::Beauty, 0.1);

        let score = scorer.score_dimensions(&scores);
        assert_eq!(score.decision, AdmissionDecision::AutoRun);
        assert!((score.spread - 0.9).abs() < 1e-9);
        assert!(score.lucky_average);
    }

    #[test]
    fn test_lucky_average_requires_auto_run() {
        let scores = DimensionScores::new()
            .with(Dimension::Safety, 1.0)
            .with(Dimension::Correctness, 0.1);
        let score = scorer().score_dimensions(&scores);
        assert_eq!(score.decision, AdmissionDecision::AskOperator);
        assert!(score.spread > 0.4);
        assert!(!score.lucky_average);
    }

    #[test]
    fn test_score_from_results() {
        let results = vec![
            EvaluatorResult::new(Dimension::Safety, 1.0, "clean"),
            EvaluatorResult::new(Dimension::Correctness, 0.95, "specific"),
        ];
        let score = scorer().score(&results);
        assert_eq!(score.decision, AdmissionDecision::AutoRun);
        assert_eq!(score.risk, 0.0);
        assert_eq!(score.dimension_scores.get(Dimension::Beauty), None);
    }

    #[test]
    fn test_empty_scores() {
        let score = scorer().score_dimensions(&DimensionScores::new());
        assert_eq!(score.composite, 0.0);
        assert_eq!(score.spread, 0.0);
        assert_eq!(score.decision, AdmissionDecision::AskOperator);
    }

    fn arb_scores() -> impl Strategy<Value = DimensionScores> {
        proptest::collection::vec(proptest::option::of(0.0_f64..=1.0), 5).prop_map(|slots| {
            let mut scores = DimensionScores::new();
            for (dimension, slot) in Dimension::ALL.into_iter().zip(slots) {
                if let Some(score) = slot {
                    scores.set(dimension, score);
                }
            }
            scores
        })
    }

    proptest! {
        #[test]
        fn prop_composite_within_unit_interval(scores in arb_scores()) {
            let composite = scorer().composite(&scores);
            prop_assert!((0.0..=1.0).contains(&composite), "composite {}", composite);
        }

        #[test]
        fn prop_scoring_is_idempotent(scores in arb_scores()) {
            let scorer = scorer();
            prop_assert_eq!(scorer.score_dimensions(&scores), scorer.score_dimensions(&scores));
        }

        #[test]
        fn prop_composite_bounded_by_extremes(scores in arb_scores()) {
            prop_assume!(!scores.is_empty());
            let composite = scorer().composite(&scores);
            let min = scores.evaluated().map(|(_, s)| s).fold(f64::INFINITY, f64::min);
            let max = scores.evaluated().map(|(_, s)| s).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(composite >= min - 1e-9 && composite <= max + 1e-9);
        }

        #[test]
        fn prop_low_safety_always_blocks(safety in 0.0_f64..0.2, composite in 0.0_f64..=1.0) {
            let (decision, _) = scorer().decide(composite, Some(safety));
            prop_assert_eq!(decision, AdmissionDecision::Block);
        }
    }
}
