//! End-to-end runs of the orchestration graph against scripted backends and
//! evaluator agents.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::config::BackendSpec;
use arbiter_core::{
    AdmissionDecision, ArbiterConfig, Complexity, Dimension, EvaluationSnapshot, EvaluatorResult,
};
use arbiter_runtime::router::RoutingRecord;
use arbiter_runtime::{
    AgentError, Backend, EvaluatorAgent, EvidenceLog, EvidenceStream, FailureKind,
    GenerateOptions, Generation, InvocationResponse, Orchestrator, ProviderError,
    RoutingContext, ShadowCompletion, ShadowDiff, TokenUsage,
};

#[derive(Clone, Copy)]
enum Script {
    Ok,
    Transient,
    Fatal,
    Hang,
}

struct MockBackend {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl MockBackend {
    fn new(name: &str, script: Script) -> (Arc<dyn Backend>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Self {
            name: name.to_string(),
            script,
            calls: Arc::clone(&calls),
        });
        (backend, calls)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<Generation, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Ok => Ok(Generation {
                text: format!("{} handled: {}", self.name, prompt),
                model: "mock".to_string(),
                usage: TokenUsage::default(),
            }),
            Script::Transient => Err(ProviderError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Script::Fatal => Err(ProviderError::AuthError),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Timeout(Duration::from_secs(3600)))
            }
        }
    }

    async fn health_check(&self) -> bool {
        !matches!(self.script, Script::Fatal)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FixedAgent {
    dimension: Dimension,
    score: f64,
    delay: Option<Duration>,
    timeout: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl EvaluatorAgent for FixedAgent {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn evaluate(&self, _snapshot: &EvaluationSnapshot) -> Result<EvaluatorResult, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(EvaluatorResult::new(self.dimension, self.score, "fixed"))
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn kind(&self) -> &'static str {
        "fixed"
    }
}

/// One agent per dimension, all returning `score`, with a call counter each.
fn fixed_agents(score: f64) -> (Vec<FixedAgent>, BTreeMap<Dimension, Arc<AtomicUsize>>) {
    let mut counters = BTreeMap::new();
    let agents = Dimension::ALL
        .iter()
        .map(|&dimension| {
            let calls = Arc::new(AtomicUsize::new(0));
            counters.insert(dimension, Arc::clone(&calls));
            FixedAgent {
                dimension,
                score,
                delay: None,
                timeout: None,
                calls,
            }
        })
        .collect();
    (agents, counters)
}

fn spec(name: &str, quality_tier: u8, latency_ms: u64) -> BackendSpec {
    BackendSpec {
        quality_tier,
        latency_ms,
        cost_per_1k_tokens: 1.0,
        local: false,
        ..BackendSpec::echo(name)
    }
}

fn config_for(specs: Vec<BackendSpec>) -> ArbiterConfig {
    let mut config = ArbiterConfig::default();
    config.router.backends = specs;
    config
}

fn build(config: ArbiterConfig, backends: Vec<Arc<dyn Backend>>, agents: Vec<FixedAgent>) -> Orchestrator {
    agents
        .into_iter()
        .fold(
            Orchestrator::builder()
                .config(config)
                .backends(backends)
                .evidence_log(EvidenceLog::disabled()),
            |builder, agent| builder.agent(Arc::new(agent)),
        )
        .build()
        .unwrap()
}

fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn kinds(response: &InvocationResponse) -> Vec<FailureKind> {
    response.errors.iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_fan_out_matches_complexity_tier() {
    for (complexity, expected) in [("low", 1), ("medium", 2), ("high", 5)] {
        let (backend, _) = MockBackend::new("main", Script::Ok);
        let (agents, counters) = fixed_agents(0.95);
        let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);

        let response = orchestrator
            .invoke("Rename the helper.", &context(&[("complexity", complexity)]))
            .await;

        let launched: usize = counters.values().map(|c| c.load(Ordering::SeqCst)).sum();
        assert_eq!(launched, expected, "complexity {}", complexity);
        assert_eq!(response.evidence.as_ref().unwrap().dimensions.len(), expected);
        assert!(response.success, "{:?}", response.error);
    }
}

#[tokio::test]
async fn test_low_tier_runs_only_safety() {
    let (backend, _) = MockBackend::new("main", Script::Ok);
    let (agents, counters) = fixed_agents(0.95);
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);

    let response = orchestrator
        .invoke("Rename the helper.", &context(&[("complexity", "low")]))
        .await;

    assert_eq!(response.complexity, Some(Complexity::Low));
    assert_eq!(counters[&Dimension::Safety].load(Ordering::SeqCst), 1);
    assert_eq!(counters[&Dimension::Beauty].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_evaluator_degrades_to_neutral() {
    let (backend, _) = MockBackend::new("main", Script::Ok);
    let (mut agents, _) = fixed_agents(0.95);
    for agent in agents.iter_mut().filter(|a| a.dimension == Dimension::Beauty) {
        agent.delay = Some(Duration::from_secs(5));
        agent.timeout = Some(Duration::from_millis(50));
    }
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);

    let response = orchestrator
        .invoke("Rework the scheduler.", &context(&[("complexity", "high")]))
        .await;

    // The run still reaches admission with all five dimensions
    let evidence = response.evidence.as_ref().unwrap();
    assert_eq!(evidence.dimensions.len(), 5);
    let beauty = evidence
        .dimensions
        .iter()
        .find(|d| d.dimension == Dimension::Beauty)
        .unwrap();
    assert_eq!(beauty.score, 0.5);
    assert!(beauty.degraded);

    assert!(response.decision.is_some());
    assert!(response
        .errors
        .iter()
        .any(|e| e.kind == FailureKind::EvaluatorFailure && e.message.contains("beauty")));
}

#[tokio::test]
async fn test_admission_outcomes_follow_scores() {
    // High scores everywhere: auto-run
    let (backend, calls) = MockBackend::new("main", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);
    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("complexity", "high")]))
        .await;
    assert_eq!(response.decision, Some(AdmissionDecision::AutoRun));
    assert_eq!(response.engine_used.as_deref(), Some("main"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Middling scores: escalate without executing
    let (backend, calls) = MockBackend::new("main", Script::Ok);
    let (agents, _) = fixed_agents(0.7);
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);
    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("complexity", "high")]))
        .await;
    assert_eq!(response.decision, Some(AdmissionDecision::AskOperator));
    assert!(response.success);
    assert_eq!(response.engine_used.as_deref(), Some("operator"));
    assert!(response.ticket.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Safety under the floor: blocked regardless of the rest
    let (backend, calls) = MockBackend::new("main", Script::Ok);
    let (mut agents, _) = fixed_agents(0.99);
    for agent in agents.iter_mut().filter(|a| a.dimension == Dimension::Safety) {
        agent.score = 0.1;
    }
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);
    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("complexity", "high")]))
        .await;
    assert_eq!(response.decision, Some(AdmissionDecision::Block));
    assert!(!response.success);
    assert!(kinds(&response).contains(&FailureKind::AdmissionHardBlock));
    assert!(response.evidence.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_failure_falls_back() {
    let (a, a_calls) = MockBackend::new("a", Script::Transient);
    let (b, b_calls) = MockBackend::new("b", Script::Ok);
    let (c, c_calls) = MockBackend::new("c", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let config = config_for(vec![spec("a", 3, 100), spec("b", 2, 100), spec("c", 1, 100)]);
    let orchestrator = build(config, vec![a, b, c], agents);

    let response = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.engine_used.as_deref(), Some("b"));
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fallback_chain_excludes_selected() {
    let (a, _) = MockBackend::new("a", Script::Ok);
    let (b, _) = MockBackend::new("b", Script::Ok);
    let (c, _) = MockBackend::new("c", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let config = config_for(vec![spec("c", 1, 100), spec("a", 3, 100), spec("b", 2, 100)]);
    let orchestrator = build(config, vec![a, b, c], agents);

    let decision = orchestrator
        .router()
        .route(&RoutingContext::new("trace"))
        .unwrap();

    assert_eq!(decision.selected_provider, "a");
    assert_eq!(decision.fallback_chain, vec!["b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn test_fatal_failure_stops_chain() {
    let (a, a_calls) = MockBackend::new("a", Script::Fatal);
    let (b, b_calls) = MockBackend::new("b", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(
        config_for(vec![spec("a", 3, 100), spec("b", 2, 100)]),
        vec![a, b],
        agents,
    );

    let response = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;

    assert!(!response.success);
    assert!(kinds(&response).contains(&FailureKind::ProviderFatal));
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_backends_failing() {
    let (a, a_calls) = MockBackend::new("a", Script::Transient);
    let (b, b_calls) = MockBackend::new("b", Script::Transient);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(
        config_for(vec![spec("a", 3, 100), spec("b", 2, 100)]),
        vec![a, b],
        agents,
    );

    let response = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;

    assert!(!response.success);
    assert!(response.outputs.is_empty());
    assert!(kinds(&response).contains(&FailureKind::ProviderTransient));
    assert!(response.error.is_some());
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_request_served_from_cache() {
    let (backend, calls) = MockBackend::new("main", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(config_for(vec![spec("main", 3, 100)]), vec![backend], agents);

    let first = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;
    let second = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;

    assert!(first.success && second.success);
    assert_eq!(first.outputs, second.outputs);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_forced_backend_is_used() {
    let (a, a_calls) = MockBackend::new("a", Script::Ok);
    let (b, b_calls) = MockBackend::new("b", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(
        config_for(vec![spec("a", 3, 100), spec("b", 1, 100)]),
        vec![a, b],
        agents,
    );

    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("backend", "b")]))
        .await;

    assert_eq!(response.engine_used.as_deref(), Some("b"));
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_forced_backend_not_served_from_other_backends_cache() {
    let (a, a_calls) = MockBackend::new("a", Script::Ok);
    let (b, b_calls) = MockBackend::new("b", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let orchestrator = build(
        config_for(vec![spec("a", 3, 100), spec("b", 1, 100)]),
        vec![a, b],
        agents,
    );

    let unforced = orchestrator.invoke("Tidy imports.", &HashMap::new()).await;
    assert_eq!(unforced.engine_used.as_deref(), Some("a"));

    let forced = orchestrator
        .invoke("Tidy imports.", &context(&[("backend", "b")]))
        .await;

    assert!(forced.success, "{:?}", forced.error);
    assert_eq!(forced.engine_used.as_deref(), Some("b"));
    assert_ne!(forced.outputs, unforced.outputs);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shadow_run_can_be_cancelled() {
    let (main, _) = MockBackend::new("main", Script::Ok);
    let (canary, canary_calls) = MockBackend::new("canary", Script::Hang);
    let (agents, _) = fixed_agents(0.95);
    let mut config = config_for(vec![spec("main", 3, 100), spec("canary", 1, 100)]);
    config.shadow.canary_backend = Some("canary".to_string());
    let orchestrator = build(config, vec![main, canary], agents);
    let mut completions = orchestrator.shadow().take_completions().unwrap();

    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("shadow", "true")]))
        .await;

    assert!(response.success);
    assert_eq!(response.engine_used.as_deref(), Some("main"));
    let shadow_trace = response.shadow_trace_id.clone().unwrap();
    assert_ne!(shadow_trace, response.trace_id);
    assert_eq!(orchestrator.shadow().in_flight(), 1);

    // Let the shadow reach the hanging canary
    tokio::time::timeout(Duration::from_secs(5), async {
        while canary_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(orchestrator.shadow().cancel(&shadow_trace));
    assert!(!orchestrator.shadow().cancel(&shadow_trace));

    let completion = tokio::time::timeout(Duration::from_secs(5), completions.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completion, ShadowCompletion::Cancelled { trace_id: shadow_trace });
    assert_eq!(orchestrator.shadow().in_flight(), 0);
}

#[tokio::test]
async fn test_evidence_files_written() {
    let dir = std::env::temp_dir().join(format!("arbiter-evidence-{}", uuid::Uuid::new_v4()));
    let log = EvidenceLog::open(&dir).unwrap();

    let (main, _) = MockBackend::new("main", Script::Ok);
    let (canary, _) = MockBackend::new("canary", Script::Ok);
    let (agents, _) = fixed_agents(0.95);
    let mut config = config_for(vec![spec("main", 3, 100), spec("canary", 1, 100)]);
    config.shadow.canary_backend = Some("canary".to_string());

    let orchestrator = agents
        .into_iter()
        .fold(
            Orchestrator::builder()
                .config(config)
                .backends(vec![main, canary])
                .evidence_log(log.clone()),
            |builder, agent| builder.agent(Arc::new(agent)),
        )
        .build()
        .unwrap();
    let mut completions = orchestrator.shadow().take_completions().unwrap();

    let response = orchestrator
        .invoke("Tidy imports.", &context(&[("shadow", "true")]))
        .await;
    assert!(response.success);

    let completion = tokio::time::timeout(Duration::from_secs(5), completions.recv())
        .await
        .unwrap()
        .unwrap();
    let ShadowCompletion::Finished(diff) = completion else {
        panic!("shadow did not finish: {:?}", completion);
    };
    assert_eq!(diff.primary_trace_id, response.trace_id);
    assert_eq!(diff.secondary_engine.as_deref(), Some("canary"));
    assert!(!diff.outputs_match);

    let routing: Vec<RoutingRecord> = log.read(EvidenceStream::RoutingHistory).unwrap();
    assert!(routing.iter().any(|r| r.trace_id == response.trace_id && r.backend == "main"));

    let diffs: Vec<ShadowDiff> = log.read(EvidenceStream::ShadowDiffs).unwrap();
    assert_eq!(diffs, vec![diff]);

    let _ = std::fs::remove_dir_all(&dir);
}
