//! Contract between the process pool and a concrete process facility.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("spawned process has no pid")]
    MissingPid,
}

/// Stream an output line was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured line of process output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

impl OutputLine {
    pub fn stdout(line: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stdout,
            line: line.into(),
        }
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self {
            stream: OutputStream::Stderr,
            line: line.into(),
        }
    }
}

/// A started OS process.
pub trait ProcessHandle: Send {
    /// OS process identifier, stable while the process is tracked.
    fn pid(&self) -> u32;

    /// Command line the process was started with.
    fn command_line(&self) -> &str;

    /// Non-blocking liveness check.
    fn is_terminated(&mut self) -> bool;

    /// Exit code once terminated; `None` while running or when killed by a signal.
    fn exit_code(&self) -> Option<i32>;

    /// Output captured since the previous call.
    fn take_output(&mut self) -> Vec<OutputLine>;
}

/// Starts processes for the pool.
pub trait Spawner: Send + Sync {
    type Handle: ProcessHandle;

    /// Start `command_line` without waiting for it.
    fn spawn(&self, command_line: &str) -> Result<Self::Handle, LaunchError>;
}
