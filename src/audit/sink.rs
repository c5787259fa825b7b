//! Where exception records go.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::error;

use super::record::ExceptionRecord;
use crate::error::SinkError;
use crate::handler::BoxFuture;

/// Durable destination for [`ExceptionRecord`]s.
///
/// Records carry their own id; a sink only appends. Implementations must
/// accept concurrent `append` calls, since several requests can fault at once.
pub trait LogSink: Send + Sync + 'static {
    fn append(&self, record: ExceptionRecord) -> BoxFuture<Result<(), SinkError>>;
}

// ── MemorySink ────────────────────────────────────────────────────────────────

/// Keeps records in memory. Clones share the same store.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<ExceptionRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExceptionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn append(&self, record: ExceptionRecord) -> BoxFuture<Result<(), SinkError>> {
        self.records.lock().push(record);
        Box::pin(async { Ok(()) })
    }
}

// ── JsonLinesSink ─────────────────────────────────────────────────────────────

/// Appends one JSON object per line to a file.
///
/// The file is opened on the first append, not at construction, so a bad
/// path shows up as a failed log attempt. A failed open is retried on the
/// next append.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Arc<tokio::sync::Mutex<Option<File>>>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: Arc::new(tokio::sync::Mutex::new(None)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLinesSink {
    fn append(&self, record: ExceptionRecord) -> BoxFuture<Result<(), SinkError>> {
        let path = self.path.clone();
        let file = Arc::clone(&self.file);
        Box::pin(async move {
            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');

            let mut guard = file.lock().await;
            if guard.is_none() {
                let opened = OpenOptions::new().create(true).append(true).open(&path).await?;
                *guard = Some(opened);
            }
            let Some(f) = guard.as_mut() else {
                return Err(SinkError::Unavailable(path.display().to_string()));
            };
            f.write_all(&line).await?;
            f.flush().await?;
            Ok(())
        })
    }
}

// ── TracingSink ───────────────────────────────────────────────────────────────

/// Emits each record as a structured `tracing` event at `ERROR` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, record: ExceptionRecord) -> BoxFuture<Result<(), SinkError>> {
        error!(
            target: "faultgate::audit",
            id = %record.id(),
            occurred_at = %record.occurred_at(),
            file = record.source_file(),
            method = record.method(),
            line = record.line_number(),
            user = record.user_name(),
            client_ip = record.client_ip(),
            "{}",
            record.message()
        );
        Box::pin(async { Ok(()) })
    }
}
