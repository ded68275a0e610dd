use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crontab_model::JobType;

use crate::{
    admission::Admission,
    aligner::{Clock, SystemClock, TimeAligner},
    config::WorkerConfig,
    error::WorkerError,
    pool::{PoolError, ProcessPool, executable_command},
    process::Spawner,
    shutdown::Termination,
    store::{JobStore, StoreError},
};

/// Long-running scheduler for one job type.
///
/// Each iteration launches the due jobs admission allows, waits for the next step boundary
/// while servicing the pool, then drains and reaps once more.
pub struct Worker<S: Spawner, C: Clock = SystemClock> {
    job_type: JobType,
    store: Arc<dyn JobStore>,
    spawner: S,
    clock: C,
    admission: Admission,
    aligner: TimeAligner,
    pool: ProcessPool<S::Handle>,
    max_iterations: Option<u64>,
}

impl<S: Spawner, C: Clock> Worker<S, C> {
    pub fn new(
        job_type: JobType,
        cfg: &WorkerConfig,
        store: Arc<dyn JobStore>,
        spawner: S,
        clock: C,
    ) -> Self {
        Self {
            job_type,
            store,
            spawner,
            clock,
            admission: Admission::new(cfg.processes_limit),
            aligner: TimeAligner::from_config(cfg),
            pool: ProcessPool::new(),
            max_iterations: None,
        }
    }

    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = admission;
        self
    }

    /// Stop [`Worker::run`] after `n` iterations instead of looping forever.
    pub fn with_max_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    #[inline]
    pub fn job_type(&self) -> &JobType {
        &self.job_type
    }

    #[inline]
    pub fn pool(&self) -> &ProcessPool<S::Handle> {
        &self.pool
    }

    /// Run the scheduling loop.
    ///
    /// Never returns `Ok` unless an iteration cap was set.
    pub async fn run(&mut self) -> Result<(), WorkerError> {
        self.run_loop(&CancellationToken::new()).await.map(|_| ())
    }

    /// Loop until `shutdown` is seen, a failure occurs or the iteration cap is hit.
    ///
    /// Cancellation is observed at the top of each iteration and while waiting for the
    /// next boundary, never in the middle of a launch or a store write.
    #[instrument(level = "info", skip_all, fields(job_type = %self.job_type))]
    async fn run_loop(&mut self, shutdown: &CancellationToken) -> Result<Termination, WorkerError> {
        info!(limit = self.admission.limit(), "worker loop started");

        let mut last_iteration = self.clock.now();
        let mut iterations: u64 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Ok(Termination::Signal);
            }
            self.launch_due_jobs().await?;

            let advanced = self
                .aligner
                .advance(
                    last_iteration,
                    &self.clock,
                    &mut self.pool,
                    self.store.as_ref(),
                    shutdown,
                )
                .await?;
            let Some(next) = advanced else {
                return Ok(Termination::Signal);
            };
            last_iteration = next;

            self.pool.drain_output();
            self.pool
                .reap(self.store.as_ref(), false, self.clock.now())
                .await?;

            iterations += 1;
            if self.max_iterations.is_some_and(|max| iterations >= max) {
                return Ok(Termination::LoopExited);
            }
        }
    }

    /// Launch every due job admission lets through.
    ///
    /// A job whose process cannot be started is skipped until it is fetched again.
    pub async fn launch_due_jobs(&mut self) -> Result<usize, WorkerError> {
        let due = self.store.due_jobs(&self.job_type).await?;
        debug!(due = due.len(), running = self.pool.len(), "fetched due jobs");

        let mut launched = 0;
        for job in due {
            let command = executable_command(&job.command);
            if !self.admission.can_launch(&self.pool, &command) {
                debug!(job_id = %job.id, command = %command, "launch refused by admission control");
                continue;
            }

            let now = self.clock.now();
            match self
                .pool
                .launch(&self.spawner, self.store.as_ref(), job, now)
                .await
            {
                Ok(_) => launched += 1,
                Err(PoolError::Launch { command, source }) => {
                    warn!(command = %command, error = %source, "failed to start process; job skipped")
                }
                Err(PoolError::Store(e)) => return Err(e.into()),
            }
        }
        Ok(launched)
    }

    /// Finalize every tracked process, running or not.
    pub async fn finalize(&mut self) -> Result<usize, StoreError> {
        self.pool
            .reap(self.store.as_ref(), true, self.clock.now())
            .await
    }

    /// Run until `shutdown` fires or the loop ends, then force-finalize the pool.
    ///
    /// A panic inside the loop is caught so the pool is still finalized. Child processes
    /// are not signalled; they keep running, only their jobs are closed.
    pub async fn run_until(&mut self, shutdown: CancellationToken) -> Termination {
        let outcome = AssertUnwindSafe(self.run_loop(&shutdown))
            .catch_unwind()
            .await;
        let termination = match outcome {
            Ok(Ok(termination)) => termination,
            Ok(Err(e)) => Termination::Failed(e),
            Err(payload) => Termination::Panicked(panic_message(payload.as_ref())),
        };
        termination.log();

        match self.finalize().await {
            Ok(finalized) => info!(finalized, "running jobs finalized"),
            Err(e) => error!(error = %e, kind = e.kind(), "failed to finalize running jobs"),
        }
        termination
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "unknown panic payload".to_string()
}
