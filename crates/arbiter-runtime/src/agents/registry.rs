//! Static evaluator registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbiter_core::config::{EvaluatorKind, EvaluatorsConfig};
use arbiter_core::Dimension;

use super::{EvaluatorAgent, HeuristicAgent, LlmJudgeAgent};
use crate::router::ProviderRouter;

/// One agent per dimension, fixed at startup.
///
/// BTreeMap keeps iteration in dimension order.
#[derive(Clone)]
pub struct EvaluatorRegistry {
    agents: BTreeMap<Dimension, Arc<dyn EvaluatorAgent>>,
}

impl EvaluatorRegistry {
    /// Built-in heuristics for every dimension.
    pub fn heuristics() -> Self {
        let agents = Dimension::ALL
            .into_iter()
            .map(|d| (d, Arc::new(HeuristicAgent::for_dimension(d)) as Arc<dyn EvaluatorAgent>))
            .collect();
        Self { agents }
    }

    /// Agents chosen per dimension by `evaluators.kinds`.
    pub fn from_config(config: &EvaluatorsConfig, router: &Arc<ProviderRouter>) -> Self {
        let agents = Dimension::ALL
            .into_iter()
            .map(|d| {
                let agent: Arc<dyn EvaluatorAgent> = match config.kind(d) {
                    EvaluatorKind::Heuristic => Arc::new(HeuristicAgent::for_dimension(d)),
                    EvaluatorKind::LlmJudge => Arc::new(LlmJudgeAgent::new(d, Arc::clone(router))),
                };
                (d, agent)
            })
            .collect();
        Self { agents }
    }

    /// Replace the agent for its dimension.
    pub fn with_agent(mut self, agent: Arc<dyn EvaluatorAgent>) -> Self {
        self.agents.insert(agent.dimension(), agent);
        self
    }

    pub fn get(&self, dimension: Dimension) -> Option<&Arc<dyn EvaluatorAgent>> {
        self.agents.get(&dimension)
    }

    /// Agents for a tier's dimensions, in tier order. Unregistered
    /// dimensions are returned separately.
    pub fn select(&self, dimensions: &[Dimension]) -> (Vec<Arc<dyn EvaluatorAgent>>, Vec<Dimension>) {
        let mut found = Vec::with_capacity(dimensions.len());
        let mut missing = Vec::new();
        for dimension in dimensions {
            match self.agents.get(dimension) {
                Some(agent) => found.push(Arc::clone(agent)),
                None => missing.push(*dimension),
            }
        }
        (found, missing)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.agents.keys().copied()
    }

    /// `(dimension, kind)` of every registered agent.
    pub fn describe(&self) -> Vec<(Dimension, &'static str)> {
        self.agents.iter().map(|(d, a)| (*d, a.kind())).collect()
    }
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        Self::heuristics()
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::config::RouterConfig;

    fn router() -> Arc<ProviderRouter> {
        Arc::new(
            ProviderRouter::from_config(
                &RouterConfig::default(),
                &crate::providers::BackendRegistry::with_defaults(),
                &crate::providers::StaticSecretProvider::new(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_heuristics_cover_every_dimension() {
        let registry = EvaluatorRegistry::heuristics();
        assert_eq!(registry.dimensions().count(), 5);
        assert!(registry.describe().iter().all(|(_, kind)| *kind == "heuristic"));
    }

    #[test]
    fn test_from_config_honors_kinds() {
        let mut config = EvaluatorsConfig::default();
        config.kinds.insert(Dimension::Beauty, EvaluatorKind::LlmJudge);

        let registry = EvaluatorRegistry::from_config(&config, &router());
        assert_eq!(registry.get(Dimension::Beauty).map(|a| a.kind()), Some("llm_judge"));
        assert_eq!(registry.get(Dimension::Safety).map(|a| a.kind()), Some("heuristic"));
    }

    #[test]
    fn test_select_keeps_tier_order() {
        let registry = EvaluatorRegistry::heuristics();
        let (agents, missing) = registry.select(&[Dimension::Safety, Dimension::Correctness]);
        let dims: Vec<_> = agents.iter().map(|a| a.dimension()).collect();

        assert_eq!(dims, vec![Dimension::Safety, Dimension::Correctness]);
        assert!(missing.is_empty());
    }
}
