use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as recorded by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    /// Never launched yet.
    #[default]
    Pending,
    /// A process has been launched and not reaped yet.
    InProgress,
    /// The last launched process was reaped.
    Done,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in progress",
            JobStatus::Done => "done",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
