//! Backend-assisted judge.
//!
//! Asks a backend through the provider router for a JSON verdict
//! `{"score": 0.0-1.0, "rationale": "..."}`. A verdict that does not parse,
//! or whose score is outside [0, 1], is an error rather than a clamped score.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbiter_core::{Dimension, EvaluationSnapshot, EvaluatorResult};

use super::{AgentError, EvaluatorAgent};
use crate::prompts;
use crate::providers::GenerateOptions;
use crate::router::{ProviderRouter, RoutingContext};

const JUDGE_MAX_TOKENS: u32 = 256;

#[derive(Debug, Deserialize)]
struct Verdict {
    score: f64,
    #[serde(default)]
    rationale: String,
}

/// Evaluator that delegates scoring to a backend.
pub struct LlmJudgeAgent {
    dimension: Dimension,
    router: Arc<ProviderRouter>,
    backend: Option<String>,
    timeout: Option<Duration>,
}

impl LlmJudgeAgent {
    pub fn new(dimension: Dimension, router: Arc<ProviderRouter>) -> Self {
        Self {
            dimension,
            router,
            backend: None,
            timeout: None,
        }
    }

    /// Always ask this backend.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn context(&self, snapshot: &EvaluationSnapshot) -> RoutingContext {
        let options = GenerateOptions {
            system: Some(prompts::judge_system_prompt(self.dimension)),
            max_tokens: JUDGE_MAX_TOKENS,
            temperature: 0.0,
            ..GenerateOptions::default()
        };
        let context = RoutingContext::new(snapshot.request_id.clone()).with_options(options);
        match &self.backend {
            Some(backend) => context.with_backend(backend.clone()),
            None => context,
        }
    }
}

#[async_trait]
impl EvaluatorAgent for LlmJudgeAgent {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn evaluate(&self, snapshot: &EvaluationSnapshot) -> Result<EvaluatorResult, AgentError> {
        let start = Instant::now();
        let generation = self
            .router
            .dispatch(&prompts::judge_request(snapshot), &self.context(snapshot))
            .await
            .map_err(|e| AgentError::Backend(e.to_string()))?;

        let (score, rationale) = parse_verdict(&generation.text)?;
        tracing::debug!(
            dimension = %self.dimension,
            backend = %generation.provider,
            score,
            "Judge verdict"
        );

        let detail = format!("{} (judged by {})", rationale, generation.provider);
        Ok(EvaluatorResult::new(self.dimension, score, detail)
            .with_duration_ms(start.elapsed().as_millis() as u64))
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn kind(&self) -> &'static str {
        "llm_judge"
    }
}

/// Extract `(score, rationale)` from a judge's answer.
///
/// Backends often wrap JSON in prose or code fences, so the outermost
/// `{...}` span is parsed.
pub fn parse_verdict(text: &str) -> Result<(f64, String), AgentError> {
    let start = text
        .find('{')
        .ok_or_else(|| AgentError::InvalidVerdict("no JSON object in answer".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| AgentError::InvalidVerdict("unterminated JSON object".to_string()))?;

    let verdict: Verdict = serde_json::from_str(&text[start..=end])
        .map_err(|e| AgentError::InvalidVerdict(e.to_string()))?;

    if !verdict.score.is_finite() || !(0.0..=1.0).contains(&verdict.score) {
        return Err(AgentError::InvalidVerdict(format!(
            "score {} outside [0, 1]",
            verdict.score
        )));
    }

    let rationale = match verdict.rationale.trim() {
        "" => "no rationale given".to_string(),
        r => r.to_string(),
    };
    Ok((verdict.score, rationale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Backend, Generation, ProviderError, TokenUsage};
    use arbiter_core::config::{BackendSpec, RouterConfig};
    use arbiter_core::Complexity;

    struct CannedBackend {
        answer: String,
    }

    #[async_trait]
    impl Backend for CannedBackend {
        async fn generate(
            &self,
            _prompt: &str,
            options: &GenerateOptions,
        ) -> Result<Generation, ProviderError> {
            assert!(options.system.is_some());
            Ok(Generation {
                text: self.answer.clone(),
                model: "judge".to_string(),
                usage: TokenUsage::default(),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "judge"
        }
    }

    fn router(answer: &str) -> Arc<ProviderRouter> {
        let config = RouterConfig {
            backends: vec![BackendSpec::echo("judge")],
            ..RouterConfig::default()
        };
        let backend: Arc<dyn Backend> = Arc::new(CannedBackend {
            answer: answer.to_string(),
        });
        Arc::new(ProviderRouter::new(&config, vec![backend]).unwrap())
    }

    fn snapshot() -> EvaluationSnapshot {
        EvaluationSnapshot::new("r1", "add a unit test for the parser", Complexity::Medium)
    }

    #[test]
    fn test_parse_plain_json() {
        let (score, rationale) = parse_verdict(r#"{"score": 0.8, "rationale": "clear"}"#).unwrap();
        assert_eq!(score, 0.8);
        assert_eq!(rationale, "clear");
    }

    #[test]
    fn test_parse_fenced_json() {
        let answer = "Here you go:\n```json\n{\"score\": 0.3, \"rationale\": \"vague\"}\n```";
        assert_eq!(parse_verdict(answer).unwrap().0, 0.3);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            parse_verdict(r#"{"score": 1.7, "rationale": "great"}"#),
            Err(AgentError::InvalidVerdict(_))
        ));
        assert!(parse_verdict(r#"{"score": -0.1}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_verdict("looks fine to me").is_err());
        assert!(parse_verdict(r#"{"score": "high"}"#).is_err());
        assert!(parse_verdict("} {").is_err());
    }

    #[test]
    fn test_missing_rationale_is_filled() {
        let (_, rationale) = parse_verdict(r#"{"score": 0.5}"#).unwrap();
        assert_eq!(rationale, "no rationale given");
    }

    #[tokio::test]
    async fn test_judge_scores_through_router() {
        let agent = LlmJudgeAgent::new(Dimension::Correctness, router(r#"{"score": 0.92, "rationale": "specific"}"#));
        let result = agent.evaluate(&snapshot()).await.unwrap();

        assert_eq!(result.name, Dimension::Correctness);
        assert_eq!(result.score, 0.92);
        assert!(result.detail.contains("judged by judge"));
    }

    #[tokio::test]
    async fn test_judge_invalid_answer_is_error() {
        let agent = LlmJudgeAgent::new(Dimension::Safety, router("I refuse"));
        assert!(matches!(
            agent.evaluate(&snapshot()).await,
            Err(AgentError::InvalidVerdict(_))
        ));
    }
}
