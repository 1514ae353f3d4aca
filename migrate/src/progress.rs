//! Progress reporting for migration runs

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::error::{MigrateError, Result};

/// Progress event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Run configured and about to scan
    MigrationStarted {
        session_id: Uuid,
        root: PathBuf,
        device_id: String,
        batch_size: usize,
        smart_mode: bool,
    },
    /// Candidate selection finished
    ScanCompleted {
        files_found: usize,
        duration: Duration,
    },
    /// Existing remote rows loaded for duplicate detection
    ExistingRecordsFetched {
        count: usize,
    },
    /// Continuing from a saved cursor
    Resuming {
        index: usize,
        files_total: usize,
    },
    /// A file could not be migrated
    FileFailed {
        relative_path: String,
        error: String,
    },
    /// A checkpoint was written
    BatchCompleted {
        batch: usize,
        total_batches: usize,
        files_processed: usize,
        files_total: usize,
        percentage: f64,
        migrated: usize,
        skipped: usize,
        errors: usize,
    },
    /// Cancellation honoured; state saved
    Interrupted {
        resume_index: usize,
    },
    /// Consecutive failure threshold reached; state saved
    Halted {
        consecutive_failures: u32,
        resume_index: usize,
    },
    /// Run finished
    Completed {
        summary: MigrationSummary,
    },
    /// Warning message
    Warning {
        message: String,
        file_path: Option<String>,
    },
}

/// Totals reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub session_id: Uuid,
    /// Cumulative ledger counters
    pub total_files: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Counters for this invocation only
    pub run_inserted: usize,
    pub run_skipped: usize,
    pub run_errors: usize,
    /// Files recorded as failed in any run and still not migrated
    pub unresolved_failures: usize,
    pub duration: Duration,
    /// Set when the run recorded errors
    pub quarantine_dir: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
}

impl MigrationSummary {
    /// True while this run failed a file or an earlier failure is still open
    pub fn has_errors(&self) -> bool {
        self.run_errors > 0 || self.unresolved_failures > 0
    }
}

/// Progress channel for receiving progress updates
pub struct ProgressChannel {
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressChannel {
    /// Create a new progress channel
    pub fn new() -> (ProgressReporter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let reporter = ProgressReporter {
            sender,
            session_id: Uuid::new_v4(),
        };
        (reporter, Self { receiver })
    }

    /// Receive the next progress event
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Try to receive a progress event without blocking
    pub fn try_recv(&mut self) -> Result<ProgressEvent> {
        self.receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => MigrateError::Generic(anyhow::anyhow!("No progress events available")),
            mpsc::error::TryRecvError::Disconnected => {
                MigrateError::Generic(anyhow::anyhow!("Progress channel disconnected"))
            }
        })
    }
}

/// Progress reporter for sending progress updates
#[derive(Clone)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    session_id: Uuid,
}

impl ProgressReporter {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Send an event. A listener that went away is not an error for the run.
    pub fn emit(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            trace!("Progress listener dropped; event discarded");
        }
    }

    pub fn warning(&self, message: impl Into<String>, file_path: Option<String>) {
        self.emit(ProgressEvent::Warning {
            message: message.into(),
            file_path,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (reporter, mut channel) = ProgressChannel::new();

        reporter.emit(ProgressEvent::ScanCompleted {
            files_found: 2,
            duration: Duration::from_millis(5),
        });
        reporter.warning("file list changed", None);
        drop(reporter);

        assert!(matches!(channel.recv().await, Some(ProgressEvent::ScanCompleted { files_found: 2, .. })));
        assert!(matches!(channel.recv().await, Some(ProgressEvent::Warning { .. })));
        assert!(channel.recv().await.is_none());
    }

    #[test]
    fn test_emit_without_listener_is_silent() {
        let (reporter, channel) = ProgressChannel::new();
        drop(channel);

        reporter.emit(ProgressEvent::Interrupted { resume_index: 3 });
    }

    #[test]
    fn test_try_recv_empty() {
        let (_reporter, mut channel) = ProgressChannel::new();
        assert!(channel.try_recv().is_err());
    }

    #[test]
    fn test_summary_errors_include_open_failures() {
        let clean_rerun = MigrationSummary {
            errors: 4,
            run_errors: 0,
            unresolved_failures: 0,
            ..Default::default()
        };
        assert!(!clean_rerun.has_errors());

        let open_failure = MigrationSummary {
            errors: 4,
            run_errors: 0,
            unresolved_failures: 1,
            ..Default::default()
        };
        assert!(open_failure.has_errors());

        let failed_now = MigrationSummary {
            run_errors: 1,
            ..Default::default()
        };
        assert!(failed_now.has_errors());
    }
}
