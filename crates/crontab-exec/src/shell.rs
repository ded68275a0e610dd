use std::{path::PathBuf, process::Stdio};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::mpsc,
};
use tracing::{debug, info, trace, warn};

use crontab_core::{
    LaunchError, OutputLine, OutputStream, ProcessHandle, Spawner, pool::OUTPUT_TARGET,
};

use crate::error::{ExecError, ExecResult};

/// Starts command lines through the platform shell (`sh -c` / `cmd /C`).
///
/// Stdout and stderr are piped and read line by line on background tasks; stdin is closed.
#[derive(Debug, Clone, Default)]
pub struct ShellSpawner {
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl ShellSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Start `command_line`. Must be called from within a tokio runtime.
    pub fn start(&self, command_line: &str) -> ExecResult<ShellProcess> {
        if command_line.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        cfg_if::cfg_if! {
            if #[cfg(target_family = "windows")] {
                let mut cmd = Command::new("cmd");
                cmd.arg("/C").arg(command_line);
            } else {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(command_line);
            }
        }
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        trace!(target: "crontab.exec.shell", %command_line, "spawn");
        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;
        let pid = child.id().ok_or(ExecError::MissingPid)?;

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, OutputStream::Stdout, pid, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, OutputStream::Stderr, pid, tx);
        }

        Ok(ShellProcess {
            pid,
            command_line: command_line.to_string(),
            child,
            output: rx,
            exit_code: None,
            terminated: false,
        })
    }
}

impl Spawner for ShellSpawner {
    type Handle = ShellProcess;

    fn spawn(&self, command_line: &str) -> Result<ShellProcess, LaunchError> {
        self.start(command_line).map_err(Into::into)
    }
}

/// Read `reader` line by line into `tx`.
///
/// Lines arriving after the handle is gone are forwarded straight to the output target.
fn pump<R>(reader: R, stream: OutputStream, pid: u32, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(mpsc::error::SendError(late)) = tx.send(OutputLine { stream, line }) {
                        forward_late(pid, &late);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(target: "crontab.exec.shell", pid, ?stream, error = %e, "output stream closed");
                    break;
                }
            }
        }
    });
}

fn forward_late(pid: u32, line: &OutputLine) {
    if line.line.is_empty() {
        return;
    }
    match line.stream {
        OutputStream::Stdout => info!(target: OUTPUT_TARGET, pid, "{}", line.line),
        OutputStream::Stderr => warn!(target: OUTPUT_TARGET, pid, "{}", line.line),
    }
}

/// A shell process started by [`ShellSpawner`].
pub struct ShellProcess {
    pid: u32,
    command_line: String,
    child: Child,
    output: mpsc::UnboundedReceiver<OutputLine>,
    exit_code: Option<i32>,
    terminated: bool,
}

impl ProcessHandle for ShellProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn command_line(&self) -> &str {
        &self.command_line
    }

    fn is_terminated(&mut self) -> bool {
        if self.terminated {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(target: "crontab.exec.shell", pid = self.pid, %status, "exited");
                self.exit_code = status.code();
                self.terminated = true;
            }
            Ok(None) => {}
            Err(e) => {
                // Status can no longer be observed; treat the process as gone.
                warn!(target: "crontab.exec.shell", pid = self.pid, error = %e, "failed to poll process");
                self.terminated = true;
            }
        }
        self.terminated
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn take_output(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        while let Ok(line) = self.output.try_recv() {
            lines.push(line);
        }
        lines
    }
}
