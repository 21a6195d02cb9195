use super::config::ConfigError;
use crate::core::io::sources::SourceError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Batch-level failures. Each of these aborts the batch before (or instead of)
/// dispatching runs; per-run failures are recorded on the run instead.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to read work items: {0}")]
    SourceRead(#[from] SourceError),

    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

impl BatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BatchError::Io {
            path: path.into(),
            source,
        }
    }
}
