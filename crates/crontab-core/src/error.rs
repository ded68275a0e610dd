use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker_sleep must be greater than zero")]
    ZeroSleep,
    #[error("worker_step must be between 1 and {max} seconds, got {got}")]
    InvalidStep { got: u32, max: u32 },
}

/// Unrecoverable worker failure; the worker stops and the process exits non-zero.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job store failure: {0}")]
    Store(#[from] StoreError),
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl WorkerError {
    /// Short category name for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Store(e) => e.kind(),
            WorkerError::Signal(_) => "signal",
        }
    }
}
