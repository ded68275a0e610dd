use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{JobId, JobStatus, JobType, Schedule, Timestamp};

/// Persisted job definition together with its last run bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Stable identifier.
    pub id: JobId,
    /// When the job should run.
    pub expression: Schedule,
    /// Shell command line.
    pub command: String,
    /// Concurrency class serviced by one worker instance.
    #[serde(rename = "type", default)]
    pub job_type: JobType,
    /// Inactive jobs are never due.
    pub active: bool,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<Timestamp>,
    /// Set when a process is launched for a job that was not already in progress.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<Timestamp>,
    /// Set when the process is reaped.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<Timestamp>,
}

impl Job {
    /// Build a fresh pending job.
    pub fn new(new: NewJob, id: JobId, now: Timestamp) -> Self {
        Self {
            id,
            expression: new.expression,
            command: new.command,
            job_type: new.job_type,
            active: new.active,
            comment: new.comment,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Run time of the last completed execution.
    ///
    /// `None` while running, before the first run, or if the bookkeeping is out of order.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }

    /// Record the launch of a process for this job.
    ///
    /// Returns `false` without touching anything when the job is already in progress, so a
    /// job that is relaunched while running keeps its original start time.
    pub fn mark_started(&mut self, now: Timestamp) -> bool {
        if self.status == JobStatus::InProgress {
            return false;
        }
        self.status = JobStatus::InProgress;
        self.started_at = Some(now);
        self.ended_at = None;
        true
    }

    /// Record the end of the process running this job.
    pub fn mark_ended(&mut self, now: Timestamp) {
        self.status = JobStatus::Done;
        self.ended_at = Some(now);
    }

    /// Apply a partial update. Returns whether any field changed.
    pub fn apply(&mut self, patch: JobPatch, now: Timestamp) -> bool {
        let mut updated = false;

        if let Some(expression) = patch.expression {
            self.expression = expression;
            updated = true;
        }
        if let Some(command) = patch.command {
            self.command = command;
            updated = true;
        }
        if let Some(job_type) = patch.job_type {
            self.job_type = job_type;
            updated = true;
        }
        if let Some(active) = patch.active {
            self.active = active;
            updated = true;
        }
        if let Some(comment) = patch.comment {
            self.comment = Some(comment);
            updated = true;
        }

        if updated {
            self.updated_at = Some(now);
        }
        updated
    }
}

/// Fields required to create a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub expression: Schedule,
    pub command: String,
    pub job_type: JobType,
    pub active: bool,
    pub comment: Option<String>,
}

/// Partial update of a job; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub expression: Option<Schedule>,
    pub command: Option<String>,
    pub job_type: Option<JobType>,
    pub active: Option<bool>,
    pub comment: Option<String>,
}
