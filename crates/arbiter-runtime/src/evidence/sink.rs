use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An append-only JSONL file in the evidence directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceStream {
    RoutingHistory,
    ShadowDiffs,
}

impl EvidenceStream {
    fn index(self) -> usize {
        match self {
            EvidenceStream::RoutingHistory => 0,
            EvidenceStream::ShadowDiffs => 1,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            EvidenceStream::RoutingHistory => "routing_history.jsonl",
            EvidenceStream::ShadowDiffs => "shadow_diffs.jsonl",
        }
    }
}

struct Inner {
    dir: PathBuf,
    /// One lazily opened writer per stream, indexed by `EvidenceStream::index`.
    writers: [Mutex<Option<BufWriter<File>>>; 2],
}

/// Shared JSONL writer. Cloning shares the open files.
///
/// Appends never fail the caller: write errors are logged and dropped.
#[derive(Clone, Default)]
pub struct EvidenceLog {
    inner: Option<Arc<Inner>>,
}

impl EvidenceLog {
    /// A log that drops everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Open (creating if needed) the evidence directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Evidence log opened");
        Ok(Self {
            inner: Some(Arc::new(Inner {
                dir,
                writers: [Mutex::new(None), Mutex::new(None)],
            })),
        })
    }

    /// Open the directory when one is configured, else a disabled log.
    pub fn from_dir(dir: Option<&Path>) -> io::Result<Self> {
        match dir {
            Some(dir) => Self::open(dir),
            None => {
                tracing::debug!("No evidence directory configured; evidence log disabled");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.inner.as_ref().map(|inner| inner.dir.as_path())
    }

    /// Full path of a stream's file, when enabled.
    pub fn path(&self, stream: EvidenceStream) -> Option<PathBuf> {
        self.dir().map(|dir| dir.join(stream.file_name()))
    }

    /// Append one record as a JSON line and flush. The write runs on the
    /// blocking pool; the record is on disk when the future resolves.
    pub async fn append<T: Serialize>(&self, stream: EvidenceStream, record: &T) {
        let Some(inner) = self.inner.clone() else {
            return;
        };
        let line = match encode(record) {
            Ok(line) => line,
            Err(e) => return report_failure(stream, Err(e)),
        };
        let result = tokio::task::spawn_blocking(move || inner.write_line(stream, &line))
            .await
            .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));
        report_failure(stream, result);
    }

    /// Read every record of a stream. A missing file reads as empty.
    pub fn read<T: DeserializeOwned>(&self, stream: EvidenceStream) -> io::Result<Vec<T>> {
        let Some(path) = self.path(stream) else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        Ok(records)
    }
}

fn encode<T: Serialize>(record: &T) -> io::Result<String> {
    serde_json::to_string(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn report_failure(stream: EvidenceStream, result: io::Result<()>) {
    if let Err(e) = result {
        tracing::warn!(
            stream = stream.file_name(),
            error = %e,
            "Failed to append evidence record"
        );
    }
}

impl Inner {
    fn write_line(&self, stream: EvidenceStream, line: &str) -> io::Result<()> {
        let mut slot = self.writers[stream.index()].lock();
        let writer = match slot.take() {
            Some(writer) => writer,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(self.dir.join(stream.file_name()))?;
                BufWriter::new(file)
            }
        };
        let writer = slot.insert(writer);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl std::fmt::Debug for EvidenceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceLog")
            .field("dir", &self.dir())
            .finish()
    }
}
