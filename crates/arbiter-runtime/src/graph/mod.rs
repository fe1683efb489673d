//! Orchestration graph.
//!
//! ```text
//! INTAKE → CLASSIFY → EVALUATE(dim)* → MERGE → ADMIT ─┬─ AUTO_RUN ─────► EXECUTE ──► VERIFY ─┐
//!                                                     ├─ ASK_OPERATOR ─► ESCALATE ─► VERIFY ─┤
//!                                                     └─ BLOCK ─────────────────────────────►┴─► REPORT
//! ```
//!
//! Evaluators fan out concurrently over one immutable snapshot and are
//! joined before MERGE. Everything else in a run is sequential. The graph
//! never retries: a failing evaluator degrades to a neutral score, while
//! validation errors, a hard block or backend exhaustion end the run.

mod state;

pub use state::{FailureKind, GraphState, Node, NodeError};

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::config::{EvaluatorsConfig, ExecutionConfig};
use arbiter_core::evaluators::patterns;
use arbiter_core::{
    AdmissionDecision, AdmissionScorer, ArbiterConfig, Complexity, ComplexityClassifier,
    Dimension, EvaluationSnapshot, EvaluatorResult, EvidenceBundle, KeywordClassifier,
    OperatorTicket, Request, RequestError,
};

use crate::agents::{AgentError, EvaluatorAgent, EvaluatorRegistry};
use crate::providers::{ErrorClass, GenerateOptions};
use crate::router::{ProviderRouter, RoutingContext};

/// Engine label reported for escalated runs.
pub const OPERATOR_ENGINE: &str = "operator";

/// Which path a run takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "profile")]
pub enum RunProfile {
    /// Normal routing
    Primary,

    /// Execution pinned to the canary backend
    Canary { backend: String },
}

impl RunProfile {
    pub fn label(&self) -> &'static str {
        match self {
            RunProfile::Primary => "primary",
            RunProfile::Canary { .. } => "canary",
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub profile: RunProfile,
    pub engine_used: Option<String>,
    pub outputs: Vec<String>,
    pub decision: Option<AdmissionDecision>,
    pub evidence: Option<EvidenceBundle>,
    pub ticket: Option<OperatorTicket>,
    pub error: Option<String>,
    pub state: GraphState,
}

impl RunReport {
    pub fn trace_id(&self) -> &str {
        &self.state.trace_id
    }

    pub fn complexity(&self) -> Option<Complexity> {
        self.state.complexity
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.state.errors
    }
}

/// Fresh trace id.
pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Runs requests through the graph.
///
/// Shares the router (and so the cache, history and circuit breaker) with
/// every other run; all other state is per run.
pub struct GraphExecutor {
    scorer: AdmissionScorer,
    classifier: Arc<dyn ComplexityClassifier>,
    registry: EvaluatorRegistry,
    router: Arc<ProviderRouter>,
    evaluators: EvaluatorsConfig,
    execution: ExecutionConfig,
}

impl GraphExecutor {
    pub fn new(
        config: &ArbiterConfig,
        router: Arc<ProviderRouter>,
        registry: EvaluatorRegistry,
    ) -> Self {
        Self {
            scorer: AdmissionScorer::new(config.admission),
            classifier: Arc::new(KeywordClassifier::new(config.classifier.clone())),
            registry,
            router,
            evaluators: config.evaluators.clone(),
            execution: config.execution,
        }
    }

    /// Replace the complexity classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn ComplexityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Run an `invoke(command, context)` call. INTAKE builds the request.
    pub async fn run(
        &self,
        command: &str,
        context: &HashMap<String, String>,
        profile: RunProfile,
    ) -> RunReport {
        match Request::from_invocation(command, context, self.execution.max_input_chars) {
            Ok(request) => self.run_request(&request, new_trace_id(), profile).await,
            Err(e) => self.reject(command, context, &e),
        }
    }

    /// Report for an invocation whose request could not be built.
    pub fn reject(
        &self,
        command: &str,
        context: &HashMap<String, String>,
        error: &RequestError,
    ) -> RunReport {
        let request_id = context.get("request_id").cloned().unwrap_or_default();
        let mut state = GraphState::new(new_trace_id(), request_id, command.trim());
        state.enter(Node::Intake);
        state.record_error(FailureKind::Validation, Node::Intake, error.to_string());
        self.report(state, RunProfile::Primary, Outcome::failed(error.to_string()))
    }

    /// Run an already-built request under the given trace id.
    pub async fn run_request(&self, request: &Request, trace_id: String, profile: RunProfile) -> RunReport {
        let mut state = GraphState::new(trace_id, request.id.clone(), request.raw_text.clone());
        let outcome = self.drive(request, &profile, &mut state).await;
        self.report(state, profile, outcome)
    }

    async fn drive(&self, request: &Request, profile: &RunProfile, state: &mut GraphState) -> Outcome {
        // INTAKE
        state.enter(Node::Intake);
        if let Err(message) = self.intake(request, profile) {
            state.record_error(FailureKind::Validation, Node::Intake, message.clone());
            return Outcome::failed(message);
        }

        // CLASSIFY
        state.enter(Node::Classify);
        let complexity = request
            .complexity
            .unwrap_or_else(|| self.classifier.classify(&request.raw_text));
        state.complexity = Some(complexity);
        tracing::info!(
            trace_id = %state.trace_id,
            complexity = %complexity,
            explicit = request.complexity.is_some(),
            classifier = self.classifier.name(),
            "Request classified"
        );

        // EVALUATE* → MERGE
        self.evaluate(request, complexity, state).await;

        // ADMIT
        state.enter(Node::Admit);
        let admission = self.scorer.score(state.evaluator_outputs.values());
        state.admission = Some(admission.clone());
        let evidence = EvidenceBundle::new(
            &state.trace_id,
            &state.request_id,
            complexity,
            &admission,
            &state.evaluator_outputs,
        )
        .with_errors(state.error_messages());

        tracing::info!(
            trace_id = %state.trace_id,
            decision = %admission.decision,
            composite = admission.composite,
            risk = admission.risk,
            "Admission decided"
        );

        match admission.decision {
            AdmissionDecision::Block => {
                let message = format!(
                    "blocked: {} below hard floor {:.2}",
                    admission.blocked_by.unwrap_or(Dimension::Safety),
                    self.scorer.config().hard_block_floor
                );
                state.record_error(FailureKind::AdmissionHardBlock, Node::Admit, message.clone());
                Outcome {
                    evidence: Some(evidence),
                    decision: Some(admission.decision),
                    ..Outcome::failed(message)
                }
            }
            AdmissionDecision::AskOperator => {
                state.enter(Node::Escalate);
                let ticket = OperatorTicket::new(evidence.clone());
                tracing::info!(
                    trace_id = %state.trace_id,
                    decision_point = %ticket.decision_point,
                    "Escalated to operator"
                );
                self.verify_ticket(&ticket, state);
                Outcome {
                    success: true,
                    engine_used: Some(OPERATOR_ENGINE.to_string()),
                    decision: Some(admission.decision),
                    evidence: Some(evidence),
                    ticket: Some(ticket),
                    ..Outcome::default()
                }
            }
            AdmissionDecision::AutoRun => {
                let mut outcome = self.execute(request, profile, state).await;
                outcome.decision = Some(admission.decision);
                outcome.evidence = Some(evidence);
                if outcome.success {
                    self.verify(&mut outcome, state);
                }
                outcome
            }
        }
    }

    fn intake(&self, request: &Request, profile: &RunProfile) -> Result<(), String> {
        let len = request.raw_text.chars().count();
        if request.raw_text.trim().is_empty() {
            return Err("input is empty".to_string());
        }
        if len > self.execution.max_input_chars {
            return Err(format!(
                "input is {} chars, limit is {}",
                len, self.execution.max_input_chars
            ));
        }
        let forced = match profile {
            RunProfile::Canary { backend } => Some(backend),
            RunProfile::Primary => request.flags.forced_backend.as_ref(),
        };
        if let Some(backend) = forced {
            if !self.router.has_backend(backend) {
                return Err(format!("backend '{}' is not configured", backend));
            }
        }
        Ok(())
    }

    /// Fan out to the tier's evaluators, then merge their results.
    async fn evaluate(&self, request: &Request, complexity: Complexity, state: &mut GraphState) {
        let dimensions = self.evaluators.tiers.for_complexity(complexity);
        let snapshot = Arc::new(EvaluationSnapshot::new(
            &request.id,
            &request.raw_text,
            complexity,
        ));

        let (agents, missing) = self.registry.select(dimensions);
        for agent in &agents {
            state.enter(Node::Evaluate(agent.dimension()));
        }

        let default_timeout = self.evaluators.timeout;
        let launches = agents.into_iter().map(|agent| {
            let snapshot = Arc::clone(&snapshot);
            let timeout = agent.timeout().unwrap_or(default_timeout);
            async move {
                let dimension = agent.dimension();
                let outcome = run_agent(agent.as_ref(), &snapshot, timeout).await;
                (dimension, outcome)
            }
        });

        // Barrier: MERGE waits for every launched evaluator
        let outcomes = join_all(launches).await;

        state.enter(Node::Merge);
        for dimension in missing {
            self.degrade(state, dimension, "no evaluator registered".to_string());
        }
        for (dimension, outcome) in outcomes {
            match outcome {
                Ok(result) if result.name == dimension => {
                    state.insert_result(result);
                }
                Ok(result) => {
                    self.degrade(
                        state,
                        dimension,
                        format!("evaluator returned a result for {}", result.name),
                    );
                }
                Err(e) => self.degrade(state, dimension, e.to_string()),
            }
        }
    }

    fn degrade(&self, state: &mut GraphState, dimension: Dimension, reason: String) {
        let neutral = self.evaluators.neutral_score(dimension);
        tracing::warn!(
            trace_id = %state.trace_id,
            dimension = %dimension,
            neutral,
            reason = %reason,
            "Evaluator degraded to neutral score"
        );
        state.record_error(
            FailureKind::EvaluatorFailure,
            Node::Evaluate(dimension),
            format!("{} evaluator failed: {}", dimension, reason),
        );
        state.insert_result(EvaluatorResult::neutral(
            dimension,
            neutral,
            format!("neutral fallback ({})", reason),
        ));
    }

    async fn execute(&self, request: &Request, profile: &RunProfile, state: &mut GraphState) -> Outcome {
        state.enter(Node::Execute);

        let options = GenerateOptions {
            max_tokens: self.execution.max_tokens,
            temperature: self.execution.temperature,
            ..GenerateOptions::default()
        };
        let mut context = RoutingContext::for_request(request, state.trace_id.clone()).with_options(options);
        if let RunProfile::Canary { backend } = profile {
            // A cached answer from another backend would hide the canary
            context = context.with_backend(backend.clone()).without_cache();
        }

        let routed = match tokio::time::timeout(
            self.execution.timeout,
            self.router.execute_with_routing(&request.raw_text, &context),
        )
        .await
        {
            Ok(routed) => routed,
            Err(_) => {
                let message = format!("execution timed out after {:?}", self.execution.timeout);
                state.record_error(FailureKind::ProviderTransient, Node::Execute, message.clone());
                return Outcome::failed(message);
            }
        };

        if !routed.success {
            let kind = match routed.error_class {
                Some(ErrorClass::Fatal) => FailureKind::ProviderFatal,
                _ => FailureKind::ProviderTransient,
            };
            let message = routed
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string());
            state.record_error(kind, Node::Execute, message.clone());
            return Outcome::failed(message);
        }

        tracing::info!(
            trace_id = %state.trace_id,
            backend = routed.provider_used.as_deref().unwrap_or_default(),
            cached = routed.cached,
            attempts = routed.attempted.len(),
            "Execution complete"
        );

        Outcome {
            success: true,
            engine_used: routed.provider_used.clone(),
            outputs: routed.text.into_iter().collect(),
            ..Outcome::default()
        }
    }

    /// Post-checks on executed output. Failures are recorded, never fatal.
    fn verify(&self, outcome: &mut Outcome, state: &mut GraphState) {
        state.enter(Node::Verify);

        if outcome.outputs.iter().all(|o| o.trim().is_empty()) {
            state.record_error(FailureKind::Verification, Node::Verify, "executed output is empty");
        }

        if outcome.outputs.iter().any(|o| patterns::contains_credentials(o)) {
            state.record_error(
                FailureKind::Verification,
                Node::Verify,
                "executed output contained credentials and was withheld",
            );
            outcome.outputs = vec!["[withheld: output contained credentials]".to_string()];
        }
    }

    /// Post-checks on an escalation: the operator must see every evaluated
    /// dimension and in-range aggregate scores. Failures are recorded, never fatal.
    fn verify_ticket(&self, ticket: &OperatorTicket, state: &mut GraphState) {
        state.enter(Node::Verify);

        let evidence = &ticket.evidence;
        let missing: Vec<String> = state
            .evaluator_outputs
            .keys()
            .filter(|dimension| !evidence.dimensions.iter().any(|d| d.dimension == **dimension))
            .map(|dimension| dimension.to_string())
            .collect();
        if !missing.is_empty() {
            state.record_error(
                FailureKind::Verification,
                Node::Verify,
                format!("operator ticket is missing evidence for {}", missing.join(", ")),
            );
        }

        let in_range = |value: f64| (0.0..=1.0).contains(&value);
        if !(in_range(evidence.composite) && in_range(evidence.risk) && in_range(evidence.spread)) {
            state.record_error(
                FailureKind::Verification,
                Node::Verify,
                "operator ticket carries out-of-range aggregate scores",
            );
        }
    }

    fn report(&self, mut state: GraphState, profile: RunProfile, outcome: Outcome) -> RunReport {
        state.enter(Node::Report);
        tracing::info!(
            trace_id = %state.trace_id,
            profile = profile.label(),
            success = outcome.success,
            steps = state.step_counter,
            errors = state.errors.len(),
            elapsed_ms = state.elapsed_ms(),
            "Run finished"
        );

        RunReport {
            success: outcome.success,
            profile,
            engine_used: outcome.engine_used,
            outputs: outcome.outputs,
            decision: outcome.decision,
            evidence: outcome.evidence,
            ticket: outcome.ticket,
            error: outcome.error,
            state,
        }
    }
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphExecutor")
            .field("classifier", &self.classifier.name())
            .field("registry", &self.registry)
            .field("router", &self.router)
            .finish()
    }
}

/// What the post-admission nodes produced.
#[derive(Debug, Default)]
struct Outcome {
    success: bool,
    engine_used: Option<String>,
    outputs: Vec<String>,
    decision: Option<AdmissionDecision>,
    evidence: Option<EvidenceBundle>,
    ticket: Option<OperatorTicket>,
    error: Option<String>,
}

impl Outcome {
    fn failed(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// One evaluator under its timeout. Panics count as failures.
async fn run_agent(
    agent: &dyn EvaluatorAgent,
    snapshot: &EvaluationSnapshot,
    timeout: Duration,
) -> Result<EvaluatorResult, AgentError> {
    let call = AssertUnwindSafe(agent.evaluate(snapshot)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Err(_) => Err(AgentError::Timeout(timeout)),
        Ok(Err(_)) => Err(AgentError::Internal("evaluator panicked".to_string())),
        Ok(Ok(result)) => result,
    }
}
