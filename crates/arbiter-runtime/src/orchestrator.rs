//! The `invoke` entry point.
//!
//! [`Orchestrator`] wires the router, evaluator registry, graph executor,
//! shadow controller and evidence log together from one [`ArbiterConfig`].
//! Each `invoke` call is one graph run plus, when sampled, one detached
//! shadow run.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use arbiter_core::{
    AdmissionDecision, ArbiterConfig, Complexity, ComplexityClassifier, ConfigError,
    EvidenceBundle, OperatorTicket, Request,
};

use crate::agents::{EvaluatorAgent, EvaluatorRegistry};
use crate::evidence::EvidenceLog;
use crate::graph::{new_trace_id, GraphExecutor, NodeError, RunReport};
use crate::providers::{Backend, BackendRegistry, EnvSecretProvider, SecretProvider};
use crate::router::{ProviderRouter, RouterError};
use crate::shadow::ShadowController;

/// Errors building an orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Router setup failed: {0}")]
    Router(#[from] RouterError),

    #[error("Cannot open evidence directory: {0}")]
    Evidence(#[from] std::io::Error),
}

/// Response to one `invoke` call.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResponse {
    pub success: bool,
    pub engine_used: Option<String>,
    pub outputs: Vec<String>,
    pub decision: Option<AdmissionDecision>,
    pub trace_id: String,
    pub complexity: Option<Complexity>,
    pub evidence: Option<EvidenceBundle>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<OperatorTicket>,

    pub errors: Vec<NodeError>,
    pub error: Option<String>,

    /// Trace id of the shadow run started for this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_trace_id: Option<String>,
}

impl From<RunReport> for InvocationResponse {
    fn from(report: RunReport) -> Self {
        Self {
            success: report.success,
            engine_used: report.engine_used,
            outputs: report.outputs,
            decision: report.decision,
            trace_id: report.state.trace_id,
            complexity: report.state.complexity,
            evidence: report.evidence,
            ticket: report.ticket,
            errors: report.state.errors,
            error: report.error,
            shadow_trace_id: None,
        }
    }
}

/// Request orchestration and admission control.
///
/// # Execution Flow
/// 1. Build and validate the request from `(command, context)`
/// 2. Pick the primary path (canary when the request asks for it)
/// 3. Run the graph: classify, evaluate, admit, then execute or escalate
/// 4. Optionally start a shadow run on the alternate path
pub struct Orchestrator {
    config: ArbiterConfig,
    executor: Arc<GraphExecutor>,
    shadow: ShadowController,
    log: EvidenceLog,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Orchestrator with every backend built from configuration and
    /// credentials read from the environment.
    pub fn from_config(config: ArbiterConfig) -> Result<Self, OrchestratorError> {
        OrchestratorBuilder::new().config(config).build()
    }

    /// Handle one request.
    ///
    /// Never returns an error: every failure is reported in the response.
    pub async fn invoke(&self, command: &str, context: &HashMap<String, String>) -> InvocationResponse {
        let request = match Request::from_invocation(command, context, self.config.execution.max_input_chars) {
            Ok(request) => request,
            Err(e) => return self.executor.reject(command, context, &e).into(),
        };

        let profile = self.shadow.primary_profile(&request);
        let report = self.executor.run_request(&request, new_trace_id(), profile).await;

        let shadow_trace_id = if self.shadow.should_shadow(&request) {
            self.shadow.spawn(&request, &report)
        } else {
            None
        };

        InvocationResponse {
            shadow_trace_id,
            ..report.into()
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        self.executor.router()
    }

    pub fn executor(&self) -> &Arc<GraphExecutor> {
        &self.executor
    }

    pub fn shadow(&self) -> &ShadowController {
        &self.shadow
    }

    pub fn evidence_log(&self) -> &EvidenceLog {
        &self.log
    }

    /// Cancel every shadow run still in flight.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.shadow.cancel_all();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled in-flight shadow runs");
        }
        cancelled
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .field("shadow", &self.shadow)
            .field("log", &self.log)
            .finish()
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: ArbiterConfig,
    backends: Option<Vec<Arc<dyn Backend>>>,
    registry: BackendRegistry,
    secrets: Box<dyn SecretProvider>,
    agents: Vec<Arc<dyn EvaluatorAgent>>,
    classifier: Option<Arc<dyn ComplexityClassifier>>,
    log: Option<EvidenceLog>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: ArbiterConfig::default(),
            backends: None,
            registry: BackendRegistry::with_defaults(),
            secrets: Box::new(EnvSecretProvider::new()),
            agents: Vec::new(),
            classifier: None,
            log: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: ArbiterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use these backend instances instead of building them from config.
    pub fn backends(mut self, backends: Vec<Arc<dyn Backend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Adapter registry used to build backends from config.
    pub fn backend_registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Where backend credentials come from.
    pub fn secrets(mut self, secrets: impl SecretProvider + 'static) -> Self {
        self.secrets = Box::new(secrets);
        self
    }

    /// Override the evaluator for the agent's dimension.
    pub fn agent(mut self, agent: Arc<dyn EvaluatorAgent>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ComplexityClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Evidence log to use instead of opening `evidence_dir`.
    pub fn evidence_log(mut self, log: EvidenceLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator, OrchestratorError> {
        let config = self.config;
        config.validate()?;

        let log = match self.log {
            Some(log) => log,
            None => EvidenceLog::from_dir(config.evidence_dir.as_deref())?,
        };

        let router = match self.backends {
            Some(backends) => ProviderRouter::new(&config.router, backends)?,
            None => ProviderRouter::from_config(&config.router, &self.registry, self.secrets.as_ref())?,
        };
        let router = Arc::new(router.with_evidence_log(log.clone()));

        let registry = self
            .agents
            .into_iter()
            .fold(EvaluatorRegistry::from_config(&config.evaluators, &router), |registry, agent| {
                registry.with_agent(agent)
            });

        let mut executor = GraphExecutor::new(&config, Arc::clone(&router), registry);
        if let Some(classifier) = self.classifier {
            executor = executor.with_classifier(classifier);
        }
        let executor = Arc::new(executor);

        let shadow = ShadowController::new(config.shadow.clone(), Arc::clone(&executor), log.clone());

        tracing::info!(
            backends = config.router.backends.len(),
            evidence = log.is_enabled(),
            shadow = config.shadow.enabled,
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            config,
            executor,
            shadow,
            log,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
