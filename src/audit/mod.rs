//! Detached persistence of exception records.
//!
//! [`AuditLogger::log_async`] returns immediately. The record is built on
//! the calling task from owned snapshots, then written by a spawned task
//! bounded by a timeout. Nothing that happens in that task can reach the
//! client whose request faulted: failures end up as `WARN` events.

mod record;
mod sink;

pub use record::{
    CLIENT_IP_MAX, CallerSnapshot, ExceptionRecord, MESSAGE_MAX, METHOD_MAX, SOURCE_FILE_MAX,
    USER_NAME_MAX,
};
pub use sink::{JsonLinesSink, LogSink, MemorySink, TracingSink};

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::fault::{Fault, FaultInfo};

/// Fire-and-forget writer in front of a [`LogSink`].
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn LogSink>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn LogSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the record now and persists it on a detached task.
    ///
    /// The returned handle is only for callers that want to observe the
    /// write (tests, shutdown hooks); dropping it does not cancel anything.
    /// `None` when there is no tokio runtime to run the write on.
    pub fn log_async(
        &self,
        caller: CallerSnapshot,
        fault: &Fault,
        info: FaultInfo,
    ) -> Option<JoinHandle<()>> {
        let record = ExceptionRecord::new(&caller, fault.message(), &info);

        let Ok(runtime) = Handle::try_current() else {
            warn!(id = %record.id(), "no async runtime, exception record dropped");
            return None;
        };

        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;
        debug!(id = %record.id(), "dispatching exception record");

        Some(runtime.spawn(async move {
            let id = record.id();
            match tokio::time::timeout(timeout, sink.append(record)).await {
                Ok(Ok(())) => debug!(%id, "exception record persisted"),
                Ok(Err(e)) => warn!(%id, error = %e, "failed to persist exception record"),
                Err(_) => warn!(%id, ?timeout, "exception record write timed out"),
            }
        }))
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}
