//! crontabd: crontab-style job worker and job management CLI.
//!
//! ```text
//! crontabd --config /etc/crontab.toml insert --expression '*/5 * * * *' --command 'backup.sh'
//! crontabd --config /etc/crontab.toml worker --type single
//! ```
mod cli;
mod commands;
mod config;

use std::{io, sync::Arc};

use anyhow::Context;
use clap::Parser;
use time::UtcOffset;
use tracing::{error, info};

use crontab_core::{
    FileJobStore, SystemClock, Worker, WorkerError, install_shutdown_handler, terminate,
};
use crontab_exec::ShellSpawner;
use crontab_model::{JobPatch, JobType, NewJob};
use crontab_observe::{local_offset, logger_init};

use crate::{
    cli::{Cli, Command},
    config::CrontabConfig,
};

fn main() {
    // Must happen while the process is still single-threaded.
    let offset = local_offset();
    let cli = Cli::parse();

    let code = match run(cli, offset) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "crontabd failed");
            eprintln!("crontabd: {e:#}");
            1
        }
    };
    terminate(code)
}

fn run(cli: Cli, offset: UtcOffset) -> anyhow::Result<i32> {
    let cfg = CrontabConfig::from_file(&cli.config)?;
    logger_init(&cfg.logger, offset).context("initializing logger")?;

    let store = FileJobStore::open(&cfg.store.path, offset)
        .with_context(|| format!("opening job store {}", cfg.store.path.display()))?;
    let out = &mut io::stdout();

    match cli.command {
        Command::Worker { job_type } => return run_worker(&cfg, store, job_type, offset),
        Command::List { columns } => commands::list(&store, &columns, out)?,
        Command::Insert {
            expression,
            command,
            job_type,
            active,
            comment,
        } => {
            let new = NewJob {
                expression,
                command,
                job_type,
                active,
                comment,
            };
            commands::insert(&store, new, out)?;
        }
        Command::Update {
            id,
            expression,
            command,
            job_type,
            active,
            comment,
        } => {
            let patch = JobPatch {
                expression,
                command,
                job_type,
                active,
                comment,
            };
            commands::update(&store, &id, patch, out)?;
        }
        Command::Delete { id } => commands::delete(&store, &id, out)?,
        Command::Export => commands::export(&store, out)?,
    }
    Ok(0)
}

fn run_worker(
    cfg: &CrontabConfig,
    store: FileJobStore,
    job_type: JobType,
    offset: UtcOffset,
) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let shutdown = install_shutdown_handler().map_err(WorkerError::Signal)?;

        info!(
            job_type = %job_type,
            store = %cfg.store.path.display(),
            processes_limit = cfg.worker.processes_limit,
            worker_sleep = cfg.worker.worker_sleep,
            worker_step = cfg.worker.worker_step,
            "worker starting"
        );

        let mut worker = Worker::new(
            job_type,
            &cfg.worker,
            Arc::new(store),
            ShellSpawner::new(),
            SystemClock::new(offset),
        );
        let termination = worker.run_until(shutdown).await;
        Ok::<_, anyhow::Error>(termination.exit_code())
    })
}
