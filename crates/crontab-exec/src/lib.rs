//! Shell-backed process facility for the crontab worker.
mod error;
pub use error::{ExecError, ExecResult};

pub mod shell;
pub use shell::{ShellProcess, ShellSpawner};
