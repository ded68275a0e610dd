use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid schedule expression {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },
    #[error("invalid job type {0:?} (expected lowercase letters, digits, '-' or '_')")]
    InvalidJobType(String),
    #[error("invalid active flag {0:?} (expected yes|no)")]
    InvalidActive(String),
}
