mod job_id;
pub use job_id::JobId;

mod job_status;
pub use job_status::JobStatus;

mod job_type;
pub use job_type::JobType;

mod job;
pub use job::{Job, JobPatch, NewJob};

mod flag;
pub use flag::parse_active;

mod schedule;
pub use schedule::Schedule;

/// Timestamp type used for every job lifecycle field.
pub type Timestamp = time::OffsetDateTime;
