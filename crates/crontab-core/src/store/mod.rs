mod file;
pub use file::FileJobStore;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crontab_model::{Job, JobId, JobType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("job store at {path} is not valid json: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("job store lock poisoned")]
    Poisoned,
    #[error("job store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "store.not_found",
            StoreError::Io { .. } => "store.io",
            StoreError::Serde { .. } => "store.serde",
            StoreError::Poisoned => "store.poisoned",
            StoreError::Backend(_) => "store.backend",
        }
    }
}

/// Persistence boundary consumed by the worker.
///
/// Deciding which jobs are due is the store's business; the worker treats the answer as
/// opaque.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Active jobs of `job_type` that are due now. Order carries no meaning.
    async fn due_jobs(&self, job_type: &JobType) -> Result<Vec<Job>, StoreError>;

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError>;

    /// Persist `job` under `id`. `Ok(false)` when no job with that id exists.
    async fn set_job(&self, id: &JobId, job: &Job) -> Result<bool, StoreError>;
}
