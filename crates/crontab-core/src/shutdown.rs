//! Termination signals and exit status.
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::WorkerError;

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// The returned token is cancelled on the first of them. Handlers are registered before
/// this returns, so a signal arriving right after is not lost. Must be called from within
/// a tokio runtime.
#[cfg(unix)]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = sighup.recv() => "SIGHUP",
        };
        info!(signal = name, "termination signal received");
        trigger.cancel();
    });
    Ok(token)
}

#[cfg(not(unix))]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(signal = "ctrl-c", "termination signal received");
            trigger.cancel();
        }
    });
    Ok(token)
}

/// Why the worker stopped.
#[derive(Debug)]
pub enum Termination {
    /// A termination signal arrived.
    Signal,
    /// An unrecoverable error ended the loop.
    Failed(WorkerError),
    /// The loop returned on its own, which it should never do.
    LoopExited,
    /// The loop panicked; carries the panic message.
    Panicked(String),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Signal => 0,
            Termination::Failed(_) | Termination::LoopExited | Termination::Panicked(_) => 1,
        }
    }

    pub fn log(&self) {
        match self {
            Termination::Signal => info!("shutting down; finalizing running jobs"),
            Termination::Failed(e) => {
                error!(error = %e, kind = e.kind(), "worker failed; finalizing running jobs")
            }
            Termination::LoopExited => {
                error!(critical = true, "worker loop exited unexpectedly; finalizing running jobs")
            }
            Termination::Panicked(msg) => {
                error!(critical = true, panic = %msg, "worker loop panicked; finalizing running jobs")
            }
        }
    }
}

/// Exit the process with `code`.
pub fn terminate(code: i32) -> ! {
    std::process::exit(code)
}
