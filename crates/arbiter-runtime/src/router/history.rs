//! Append-only routing history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::evidence::{EvidenceLog, EvidenceStream};

/// What happened to one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    Success,
    CacheHit,
    TransientFailure,
    FatalFailure,
}

/// One dispatch, as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub backend: String,
    pub reasoning: String,
    pub confidence: f64,
    pub outcome: RoutingOutcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded in-memory history, mirrored to `routing_history.jsonl` when an
/// evidence directory is configured.
///
/// The oldest records are dropped once `capacity` is reached.
pub struct RoutingHistory {
    records: Mutex<VecDeque<RoutingRecord>>,
    capacity: usize,
    log: EvidenceLog,
}

impl RoutingHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            log: EvidenceLog::disabled(),
        }
    }

    pub fn with_log(mut self, log: EvidenceLog) -> Self {
        self.log = log;
        self
    }

    pub async fn record(&self, record: RoutingRecord) {
        self.log.append(EvidenceStream::RoutingHistory, &record).await;

        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Copy of the retained records, oldest first.
    pub fn records(&self) -> Vec<RoutingRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Retained records for one trace.
    pub fn for_trace(&self, trace_id: &str) -> Vec<RoutingRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.trace_id == trace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for RoutingHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingHistory")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
