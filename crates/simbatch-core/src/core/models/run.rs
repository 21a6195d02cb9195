use super::work_item::WorkItem;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single invocation. Recorded on the run, never propagated to siblings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Failed to launch run: {0}")]
    Launch(String),

    #[error("Run exited with status {code:?}: {message}")]
    ExitStatus { code: Option<i32>, message: String },

    #[error("Run I/O failure on '{path}': {message}", path = path.display())]
    Io { path: PathBuf, message: String },

    #[error("Run panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl InvocationError {
    pub fn other(message: impl Into<String>) -> Self {
        InvocationError::Other(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item bookkeeping for one invocation of the simulation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub item: WorkItem,
    pub output_path: PathBuf,
    pub log_path: PathBuf,
    pub status: RunStatus,
    pub error: Option<InvocationError>,
    pub elapsed: Option<Duration>,
}

impl RunRecord {
    pub fn pending(item: WorkItem, output_path: PathBuf, log_path: PathBuf) -> Self {
        Self {
            item,
            output_path,
            log_path,
            status: RunStatus::Pending,
            error: None,
            elapsed: None,
        }
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = RunStatus::Running;
    }

    pub(crate) fn finish(&mut self, result: Result<(), InvocationError>, elapsed: Duration) {
        self.elapsed = Some(elapsed);
        match result {
            Ok(()) => {
                self.status = RunStatus::Completed;
                self.error = None;
            }
            Err(e) => {
                self.status = RunStatus::Failed;
                self.error = Some(e);
            }
        }
    }
}
