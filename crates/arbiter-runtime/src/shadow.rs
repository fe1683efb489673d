//! Shadow and canary runs.
//!
//! A sampled request is run a second time on the alternate path (primary
//! and canary profiles swap) in a detached task. The secondary run is
//! compared with the primary and the diff appended to `shadow_diffs.jsonl`.
//! Nothing a shadow run does can reach the primary response.
//!
//! Each shadow run has its own cancellation channel, so one can be stopped
//! without touching the others.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use arbiter_core::config::ShadowConfig;
use arbiter_core::Request;

use crate::evidence::{EvidenceLog, EvidenceStream};
use crate::graph::{new_trace_id, GraphExecutor, RunProfile, RunReport};

/// Completions buffered for a reader before new ones are dropped.
const COMPLETION_BUFFER: usize = 256;

/// Comparison of a primary run with its shadow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowDiff {
    pub timestamp: DateTime<Utc>,
    pub input: String,
    pub primary_trace_id: String,
    pub primary_engine: Option<String>,
    pub primary_success: bool,
    pub secondary_profile: String,
    pub secondary_trace_id: String,
    pub secondary_engine: Option<String>,
    pub secondary_success: bool,
    pub secondary_error_count: usize,

    /// Both runs produced the same outputs
    pub outputs_match: bool,
}

impl ShadowDiff {
    pub fn new(primary: &RunReport, secondary: &RunReport) -> Self {
        Self {
            timestamp: Utc::now(),
            input: primary.state.input.clone(),
            primary_trace_id: primary.trace_id().to_string(),
            primary_engine: primary.engine_used.clone(),
            primary_success: primary.success,
            secondary_profile: secondary.profile.label().to_string(),
            secondary_trace_id: secondary.trace_id().to_string(),
            secondary_engine: secondary.engine_used.clone(),
            secondary_success: secondary.success,
            secondary_error_count: secondary.errors().len(),
            outputs_match: primary.outputs == secondary.outputs,
        }
    }
}

/// How a shadow run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ShadowCompletion {
    Finished(ShadowDiff),
    TimedOut { trace_id: String },
    Cancelled { trace_id: String },
}

impl ShadowCompletion {
    pub fn trace_id(&self) -> &str {
        match self {
            ShadowCompletion::Finished(diff) => &diff.secondary_trace_id,
            ShadowCompletion::TimedOut { trace_id } | ShadowCompletion::Cancelled { trace_id } => {
                trace_id
            }
        }
    }
}

type InFlight = Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>;

/// Samples requests and runs their shadows.
pub struct ShadowController {
    config: ShadowConfig,
    executor: Arc<GraphExecutor>,
    log: EvidenceLog,
    in_flight: InFlight,
    completions: mpsc::Sender<ShadowCompletion>,
    receiver: Mutex<Option<mpsc::Receiver<ShadowCompletion>>>,
}

impl ShadowController {
    pub fn new(config: ShadowConfig, executor: Arc<GraphExecutor>, log: EvidenceLog) -> Self {
        let (completions, receiver) = mpsc::channel(COMPLETION_BUFFER);
        Self {
            config,
            executor,
            log,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            completions,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Whether this request gets a shadow run.
    ///
    /// An explicit flag always wins. Without one, sampling applies only
    /// when shadowing is enabled.
    pub fn should_shadow(&self, request: &Request) -> bool {
        match request.flags.shadow {
            Some(flag) => flag,
            None if self.config.enabled => {
                let rate = self.config.sample_rate.clamp(0.0, 1.0);
                rate > 0.0 && rand::thread_rng().gen::<f64>() < rate
            }
            None => false,
        }
    }

    fn canary(&self) -> Option<RunProfile> {
        self.config
            .canary_backend
            .clone()
            .map(|backend| RunProfile::Canary { backend })
    }

    /// Path the request's primary run takes.
    pub fn primary_profile(&self, request: &Request) -> RunProfile {
        match (request.flags.canary_override, self.canary()) {
            (true, Some(canary)) => canary,
            (true, None) => {
                tracing::warn!(request_id = %request.id, "Canary requested but no canary backend configured");
                RunProfile::Primary
            }
            (false, _) => RunProfile::Primary,
        }
    }

    /// The alternate path. `None` when there is no canary to swap with.
    pub fn secondary_profile(&self, primary: &RunProfile) -> Option<RunProfile> {
        match primary {
            RunProfile::Primary => self.canary(),
            RunProfile::Canary { .. } => Some(RunProfile::Primary),
        }
    }

    /// Start a shadow of `primary`. Returns the shadow's trace id.
    pub fn spawn(&self, request: &Request, primary: &RunReport) -> Option<String> {
        let Some(profile) = self.secondary_profile(&primary.profile) else {
            tracing::debug!(
                trace_id = %primary.trace_id(),
                "No alternate path configured; shadow skipped"
            );
            return None;
        };

        let trace_id = new_trace_id();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.in_flight.lock().insert(trace_id.clone(), cancel_tx);

        let executor = Arc::clone(&self.executor);
        let in_flight = Arc::clone(&self.in_flight);
        let log = self.log.clone();
        let completions = self.completions.clone();
        let timeout = self.config.timeout;
        let shadow_request = request.fork();
        let primary = primary.clone();
        let shadow_trace = trace_id.clone();

        tracing::info!(
            primary_trace_id = %primary.trace_id(),
            trace_id = %trace_id,
            profile = profile.label(),
            "Shadow run started"
        );

        tokio::spawn(async move {
            let run = executor.run_request(&shadow_request, shadow_trace.clone(), profile);
            let completion = tokio::select! {
                finished = tokio::time::timeout(timeout, run) => match finished {
                    Ok(secondary) => {
                        let diff = ShadowDiff::new(&primary, &secondary);
                        log.append(EvidenceStream::ShadowDiffs, &diff).await;
                        tracing::info!(
                            trace_id = %shadow_trace,
                            primary_success = diff.primary_success,
                            secondary_success = diff.secondary_success,
                            outputs_match = diff.outputs_match,
                            "Shadow run finished"
                        );
                        ShadowCompletion::Finished(diff)
                    }
                    Err(_) => {
                        tracing::warn!(trace_id = %shadow_trace, ?timeout, "Shadow run timed out");
                        ShadowCompletion::TimedOut { trace_id: shadow_trace.clone() }
                    }
                },
                _ = cancel_rx => {
                    tracing::info!(trace_id = %shadow_trace, "Shadow run cancelled");
                    ShadowCompletion::Cancelled { trace_id: shadow_trace.clone() }
                }
            };

            in_flight.lock().remove(&shadow_trace);
            if completions.try_send(completion).is_err() {
                tracing::debug!(trace_id = %shadow_trace, "Shadow completion dropped; no reader");
            }
        });

        Some(trace_id)
    }

    /// Cancel one shadow run. Returns false if it is not in flight.
    pub fn cancel(&self, trace_id: &str) -> bool {
        match self.in_flight.lock().remove(trace_id) {
            Some(cancel) => {
                let _ = cancel.send(());
                true
            }
            None => false,
        }
    }

    /// Cancel every shadow run. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let cancels: Vec<_> = self.in_flight.lock().drain().collect();
        let count = cancels.len();
        for (_, cancel) in cancels {
            let _ = cancel.send(());
        }
        count
    }

    /// Number of shadow runs still going.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Take the completion stream. Only the first caller gets it.
    pub fn take_completions(&self) -> Option<mpsc::Receiver<ShadowCompletion>> {
        self.receiver.lock().take()
    }
}

impl std::fmt::Debug for ShadowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowController")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::EvaluatorRegistry;
    use crate::router::ProviderRouter;
    use arbiter_core::config::{BackendSpec, RouterConfig};
    use arbiter_core::ArbiterConfig;
    use std::collections::HashMap as Map;
    use std::time::Duration;

    fn config() -> ArbiterConfig {
        let mut config = ArbiterConfig::default();
        config.router = RouterConfig {
            backends: vec![BackendSpec::echo("main"), BackendSpec::echo("canary")],
            ..RouterConfig::default()
        };
        config.shadow = ShadowConfig {
            enabled: true,
            sample_rate: 0.0,
            canary_backend: Some("canary".to_string()),
            timeout: Duration::from_secs(5),
        };
        config
    }

    fn controller(config: &ArbiterConfig, log: EvidenceLog) -> ShadowController {
        let router = Arc::new(
            ProviderRouter::from_config(
                &config.router,
                &crate::providers::BackendRegistry::with_defaults(),
                &crate::providers::StaticSecretProvider::new(),
            )
            .unwrap(),
        );
        let executor = Arc::new(GraphExecutor::new(config, router, EvaluatorRegistry::heuristics()));
        ShadowController::new(config.shadow.clone(), executor, log)
    }

    fn request(flags: &[(&str, &str)]) -> Request {
        let context: Map<String, String> = flags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Request::from_invocation("Summarize the README.", &context, 1000).unwrap()
    }

    #[test]
    fn test_explicit_flag_wins_over_rate() {
        let mut config = config();
        let shadow = controller(&config, EvidenceLog::disabled());
        assert!(shadow.should_shadow(&request(&[("shadow", "true")])));
        assert!(!shadow.should_shadow(&request(&[])));

        config.shadow.sample_rate = 1.0;
        let shadow = controller(&config, EvidenceLog::disabled());
        assert!(shadow.should_shadow(&request(&[])));
        assert!(!shadow.should_shadow(&request(&[("shadow", "false")])));
    }

    #[test]
    fn test_disabled_ignores_rate() {
        let mut config = config();
        config.shadow.enabled = false;
        config.shadow.sample_rate = 1.0;
        let shadow = controller(&config, EvidenceLog::disabled());
        assert!(!shadow.should_shadow(&request(&[])));
    }

    #[test]
    fn test_profiles_swap() {
        let shadow = controller(&config(), EvidenceLog::disabled());
        let canary = RunProfile::Canary {
            backend: "canary".to_string(),
        };

        assert_eq!(shadow.primary_profile(&request(&[])), RunProfile::Primary);
        assert_eq!(shadow.primary_profile(&request(&[("canary", "true")])), canary);
        assert_eq!(shadow.secondary_profile(&RunProfile::Primary), Some(canary.clone()));
        assert_eq!(shadow.secondary_profile(&canary), Some(RunProfile::Primary));
    }

    #[tokio::test]
    async fn test_shadow_run_writes_diff() {
        let dir = std::env::temp_dir().join(format!("arbiter-shadow-{}", uuid::Uuid::new_v4()));
        let log = EvidenceLog::open(&dir).unwrap();
        let config = config();
        let shadow = controller(&config, log.clone());
        let mut completions = shadow.take_completions().unwrap();
        assert!(shadow.take_completions().is_none());

        let request = request(&[("shadow", "true")]);
        let primary = shadow
            .executor
            .run_request(&request, new_trace_id(), RunProfile::Primary)
            .await;
        let trace_id = shadow.spawn(&request, &primary).unwrap();

        let completion = completions.recv().await.unwrap();
        assert_eq!(completion.trace_id(), trace_id);
        let ShadowCompletion::Finished(diff) = completion else {
            panic!("expected a finished shadow run");
        };
        assert_eq!(diff.secondary_profile, "canary");
        assert_eq!(diff.secondary_engine.as_deref(), Some("canary"));
        assert!(diff.primary_success && diff.secondary_success);
        assert_eq!(shadow.in_flight(), 0);

        let persisted: Vec<ShadowDiff> = log.read(EvidenceStream::ShadowDiffs).unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].secondary_trace_id, trace_id);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_cancel_unknown_trace() {
        let shadow = controller(&config(), EvidenceLog::disabled());
        assert!(!shadow.cancel("missing"));
        assert_eq!(shadow.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_no_canary_means_no_shadow() {
        let mut config = config();
        config.shadow.canary_backend = None;
        let shadow = controller(&config, EvidenceLog::disabled());

        let request = request(&[("shadow", "true")]);
        let primary = shadow
            .executor
            .run_request(&request, new_trace_id(), RunProfile::Primary)
            .await;
        assert!(shadow.spawn(&request, &primary).is_none());
        assert_eq!(shadow.in_flight(), 0);
    }
}
