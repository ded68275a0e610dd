//! Public data model of the crontab worker: jobs, their identifiers, lifecycle and schedules.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;
