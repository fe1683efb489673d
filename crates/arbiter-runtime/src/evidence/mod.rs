//! Persisted evidence.
//!
//! Routing history and shadow diffs are appended as JSON lines to files in
//! the configured evidence directory. Without a directory the log is
//! disabled and appends are dropped.

mod sink;

pub use sink::{EvidenceLog, EvidenceStream};
