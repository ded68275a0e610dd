//! Scheduling core of the crontab worker.
//!
//! The [`Worker`] owns a [`ProcessPool`] and drives it from a single task: fetch due jobs from a
//! [`JobStore`], let the [`Admission`] controller gate each launch, then let the
//! [`TimeAligner`] wait for the next step boundary while it drains output and reaps finished
//! processes. Process launching is abstracted behind [`Spawner`] so the pool never depends on a
//! concrete process facility.

pub mod admission;
pub use admission::Admission;
pub mod aligner;
pub use aligner::{Clock, SystemClock, TimeAligner};
pub mod config;
pub use config::WorkerConfig;
pub mod error;
pub use error::{ConfigError, WorkerError};
pub mod pool;
pub use pool::{PoolError, ProcessEntry, ProcessPool};
pub mod process;
pub use process::{LaunchError, OutputLine, OutputStream, ProcessHandle, Spawner};
pub mod shutdown;
pub use shutdown::{Termination, install_shutdown_handler, terminate};
pub mod store;
pub use store::{FileJobStore, JobStore, StoreError};
pub mod worker;
pub use worker::Worker;

#[cfg(test)]
pub(crate) mod testing;
