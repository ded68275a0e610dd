use thiserror::Error;

use crontab_core::LaunchError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("spawned process has no pid")]
    MissingPid,
}

impl From<ExecError> for LaunchError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::EmptyCommand => LaunchError::EmptyCommand,
            ExecError::MissingPid => LaunchError::MissingPid,
            ExecError::Spawn(reason) => LaunchError::Spawn(reason),
        }
    }
}
