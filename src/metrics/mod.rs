//! Client query metrics.
//!
//! A [`Recorder`] receives one [`Measurement`] per client call. The
//! measurement is produced by a [`Recording`] guard: the guard starts the
//! clock when it is created and reports when it is dropped. This gives
//! exactly one observation per call on every exit path, including `?`
//! returns, cancelled futures and unwinding panics.
//!
//! Recording failures are never returned to the caller. The guard logs them
//! and moves on.

use std::time::{Duration, Instant};

use tracing::warn;

pub mod instruments;
mod recorder;

pub use recorder::{ClientQueryRecorder, ClientType, NamespaceFilter};

/// Errors a recorder backend may report.
///
/// These never reach the caller of a client operation.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The backend refused the measurement.
    #[error("measurement rejected: {0}")]
    Rejected(String),

    /// The backend is not reachable.
    #[error("recorder unavailable: {0}")]
    Unavailable(String),
}

/// One completed client call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Operation name in snake_case (e.g. `server_version`).
    pub operation: &'static str,
    /// Wall time between call entry and exit.
    pub elapsed: Duration,
}

/// Sink for client query measurements.
///
/// Implementations are bound to a client identity (type, kind, namespace)
/// at construction and shared between calls.
pub trait Recorder: Send + Sync {
    /// Called when a call starts.
    fn begin(&self, _operation: &'static str) {}

    /// Called once when a call finishes.
    fn observe(&self, measurement: &Measurement) -> Result<(), RecordError>;
}

/// Scoped measurement of a single call.
///
/// Reports to its recorder when dropped.
#[must_use = "the measurement is reported when the recording is dropped"]
pub struct Recording<'a> {
    recorder: &'a dyn Recorder,
    operation: &'static str,
    started: Instant,
}

impl<'a> Recording<'a> {
    /// Start measuring `operation`.
    pub fn start(recorder: &'a dyn Recorder, operation: &'static str) -> Self {
        recorder.begin(operation);
        Self {
            recorder,
            operation,
            started: Instant::now(),
        }
    }

    /// Operation being measured.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Drop for Recording<'_> {
    fn drop(&mut self) {
        let measurement = Measurement {
            operation: self.operation,
            elapsed: self.started.elapsed(),
        };
        if let Err(e) = self.recorder.observe(&measurement) {
            warn!(
                target: "kube_advice::metrics",
                operation = self.operation,
                error = %e,
                "Failed to record client query"
            );
        }
    }
}
