//! Processes started by the worker, keyed by pid.
use std::collections::BTreeMap;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crontab_model::{Job, JobId};

use crate::{
    process::{LaunchError, OutputLine, OutputStream, ProcessHandle, Spawner},
    store::{JobStore, StoreError},
};

/// Tracing target carrying forwarded child output.
pub const OUTPUT_TARGET: &str = "crontab.job.output";

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to launch {command:?}: {source}")]
    Launch {
        command: String,
        #[source]
        source: LaunchError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Command line actually handed to the shell for `command`.
///
/// On unix the `exec` prefix makes the shell replace itself, so the tracked pid is the
/// job's own. `cmd /C` has no equivalent and gets the command unchanged.
#[inline]
pub fn executable_command(command: &str) -> String {
    if cfg!(unix) {
        format!("exec {command}")
    } else {
        command.to_string()
    }
}

/// A running process and the job it executes.
pub struct ProcessEntry<H> {
    pub process: H,
    pub job: Job,
}

pub struct ProcessPool<H: ProcessHandle> {
    entries: BTreeMap<u32, ProcessEntry<H>>,
}

impl<H: ProcessHandle> Default for ProcessPool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ProcessHandle> ProcessPool<H> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessEntry<H>> {
        self.entries.get(&pid)
    }

    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Whether a tracked process was started with exactly `command_line`.
    pub fn is_running(&self, command_line: &str) -> bool {
        self.entries
            .values()
            .any(|entry| entry.process.command_line() == command_line)
    }

    /// Start `job` and track it.
    ///
    /// The first launch of a run stamps `started_at`/`in progress` and persists the job
    /// before the entry is recorded. When that write fails the process keeps running and is
    /// still tracked so finalization covers it; the store error is returned afterwards.
    pub async fn launch<S>(
        &mut self,
        spawner: &S,
        store: &dyn JobStore,
        mut job: Job,
        now: OffsetDateTime,
    ) -> Result<u32, PoolError>
    where
        S: Spawner<Handle = H>,
    {
        let command = executable_command(&job.command);
        let process = spawner
            .spawn(&command)
            .map_err(|source| PoolError::Launch {
                command: command.clone(),
                source,
            })?;
        let pid = process.pid();

        let persisted = if job.mark_started(now) {
            store.set_job(&job.id, &job).await
        } else {
            debug!(job_id = %job.id, "job already in progress; keeping original start time");
            Ok(true)
        };

        let job_id = job.id.clone();
        if let Some(previous) = self.entries.insert(pid, ProcessEntry { process, job }) {
            warn!(pid, replaced = %previous.job.id, "pid was still tracked; entry replaced");
        }

        match persisted {
            Ok(true) => {}
            Ok(false) => warn!(job_id = %job_id, "job vanished from the store before launch"),
            Err(e) => return Err(e.into()),
        }

        info!(job_id = %job_id, pid, command = %command, "process launched");
        Ok(pid)
    }

    /// Forward output captured since the last drain.
    pub fn drain_output(&mut self) {
        for (pid, entry) in self.entries.iter_mut() {
            for line in entry.process.take_output() {
                forward(*pid, &entry.job.id, &line);
            }
        }
    }

    /// Finalize terminated processes (every process when `force_all`) and drop them.
    ///
    /// Each finalized job is marked `done` with `ended_at = now` and persisted before its
    /// entry is removed. Outside forced mode a store failure aborts the pass and leaves the
    /// failing entry tracked. A forced pass attempts every entry, drops them all and reports
    /// the first store failure afterwards.
    pub async fn reap(
        &mut self,
        store: &dyn JobStore,
        force_all: bool,
        now: OffsetDateTime,
    ) -> Result<usize, StoreError> {
        let finished: Vec<u32> = self
            .entries
            .iter_mut()
            .filter_map(|(pid, entry)| (force_all || entry.process.is_terminated()).then_some(*pid))
            .collect();

        let mut reaped = 0;
        let mut failure = None;
        for pid in finished {
            let Some(entry) = self.entries.get_mut(&pid) else {
                continue;
            };

            for line in entry.process.take_output() {
                forward(pid, &entry.job.id, &line);
            }

            entry.job.mark_ended(now);
            match store.set_job(&entry.job.id, &entry.job).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %entry.job.id, pid, "job vanished from the store before finalization")
                }
                Err(e) if force_all => {
                    error!(job_id = %entry.job.id, pid, error = %e, "failed to persist finalized job");
                    failure.get_or_insert(e);
                    self.entries.remove(&pid);
                    continue;
                }
                Err(e) => return Err(e),
            }

            info!(
                job_id = %entry.job.id,
                pid,
                exit_code = ?entry.process.exit_code(),
                forced = force_all,
                "process finalized"
            );
            self.entries.remove(&pid);
            reaped += 1;
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(reaped),
        }
    }
}

fn forward(pid: u32, job_id: &JobId, line: &OutputLine) {
    if line.line.is_empty() {
        return;
    }
    match line.stream {
        OutputStream::Stdout => info!(target: OUTPUT_TARGET, job_id = %job_id, pid, "{}", line.line),
        OutputStream::Stderr => warn!(target: OUTPUT_TARGET, job_id = %job_id, pid, "{}", line.line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSpawner, FlakyStore, store_with};
    use crontab_model::JobStatus;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);
    const T1: OffsetDateTime = datetime!(2024-05-01 12:03 UTC);

    #[cfg(unix)]
    #[test]
    fn command_is_prefixed_with_exec() {
        assert_eq!(executable_command("echo hi"), "exec echo hi");
    }

    #[cfg(not(unix))]
    #[test]
    fn command_is_passed_unchanged() {
        assert_eq!(executable_command("echo hi"), "echo hi");
    }

    #[tokio::test]
    async fn launch_marks_job_started_and_tracks_pid() {
        let spawner = FakeSpawner::new();
        let (store, jobs) = store_with(&["echo hi"]);
        let mut pool = ProcessPool::new();

        let pid = pool.launch(&spawner, &store, jobs[0].clone(), T0).await.unwrap();

        assert_eq!(pool.len(), 1);
        assert!(pool.is_running("exec echo hi"));
        assert!(!pool.is_running("echo hi"));
        assert_eq!(spawner.spawned(), vec!["exec echo hi".to_string()]);

        let entry = pool.get(pid).unwrap();
        assert_eq!(entry.job.status, JobStatus::InProgress);

        let stored = store.job(&jobs[0].id).unwrap();
        assert_eq!(stored.status, JobStatus::InProgress);
        assert_eq!(stored.started_at, Some(T0));
        assert_eq!(stored.ended_at, None);
    }

    #[tokio::test]
    async fn relaunch_of_in_progress_job_keeps_start_time() {
        let spawner = FakeSpawner::new();
        let (store, jobs) = store_with(&["sleep 100"]);
        let mut pool = ProcessPool::new();

        pool.launch(&spawner, &store, jobs[0].clone(), T0).await.unwrap();
        let fetched = store.job(&jobs[0].id).unwrap();
        pool.launch(&spawner, &store, fetched, T1).await.unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(store.job(&jobs[0].id).unwrap().started_at, Some(T0));
        assert!(pool.pids().all(|pid| pool.get(pid).unwrap().job.started_at == Some(T0)));
    }

    #[tokio::test]
    async fn spawn_failure_leaves_pool_and_store_untouched() {
        let spawner = FakeSpawner::new();
        spawner.fail_on("exec missing-binary");
        let (store, jobs) = store_with(&["missing-binary"]);
        let mut pool = ProcessPool::new();

        let err = pool
            .launch(&spawner, &store, jobs[0].clone(), T0)
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Launch { ref command, .. } if command == "exec missing-binary"));
        assert!(pool.is_empty());
        assert_eq!(store.job(&jobs[0].id).unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn failed_start_write_still_tracks_process() {
        let spawner = FakeSpawner::new();
        let (inner, jobs) = store_with(&["echo hi"]);
        let store = FlakyStore::new(inner);
        store.fail_writes();
        let mut pool = ProcessPool::new();

        let err = pool
            .launch(&spawner, &store, jobs[0].clone(), T0)
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Store(StoreError::Backend(_))));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn reap_only_finalizes_terminated_processes() {
        let spawner = FakeSpawner::new();
        let (store, jobs) = store_with(&["a", "b"]);
        let mut pool = ProcessPool::new();
        let first = pool.launch(&spawner, &store, jobs[0].clone(), T0).await.unwrap();
        let second = pool.launch(&spawner, &store, jobs[1].clone(), T0).await.unwrap();

        assert_eq!(pool.reap(&store, false, T1).await.unwrap(), 0);

        spawner.terminate(first);
        assert_eq!(pool.reap(&store, false, T1).await.unwrap(), 1);
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());

        let done = store.job(&jobs[0].id).unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.ended_at, Some(T1));
        assert_eq!(done.duration(), Some(time::Duration::minutes(3)));
        assert_eq!(store.job(&jobs[1].id).unwrap().status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn forced_reap_empties_pool() {
        let spawner = FakeSpawner::new();
        let (store, jobs) = store_with(&["a", "b", "c"]);
        let mut pool = ProcessPool::new();
        for job in &jobs {
            pool.launch(&spawner, &store, job.clone(), T0).await.unwrap();
        }

        assert_eq!(pool.reap(&store, true, T1).await.unwrap(), 3);
        assert!(pool.is_empty());
        for job in &jobs {
            assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Done);
        }
    }

    #[tokio::test]
    async fn reap_consumes_remaining_output() {
        let spawner = FakeSpawner::new();
        let (store, jobs) = store_with(&["echo hi"]);
        let mut pool = ProcessPool::new();
        let pid = pool.launch(&spawner, &store, jobs[0].clone(), T0).await.unwrap();

        spawner.push_output(pid, OutputLine::stdout("hi"));
        pool.drain_output();
        assert_eq!(spawner.pending_output(pid), 0);

        spawner.push_output(pid, OutputLine::stderr("late"));
        spawner.terminate(pid);
        pool.reap(&store, false, T1).await.unwrap();
        assert_eq!(spawner.pending_output(pid), 0);
    }

    #[tokio::test]
    async fn failed_finalize_write_keeps_entry() {
        let spawner = FakeSpawner::new();
        let (inner, jobs) = store_with(&["a"]);
        let store = FlakyStore::new(inner);
        let mut pool = ProcessPool::new();
        let pid = pool.launch(&spawner, &store, jobs[0].clone(), T0).await.unwrap();

        store.fail_writes();
        spawner.terminate(pid);

        assert!(pool.reap(&store, false, T1).await.is_err());
        assert!(pool.get(pid).is_some());
    }

    #[tokio::test]
    async fn forced_reap_survives_a_failed_write() {
        let spawner = FakeSpawner::new();
        let (inner, jobs) = store_with(&["a", "b", "c"]);
        let store = FlakyStore::new(inner);
        let mut pool = ProcessPool::new();
        for job in &jobs {
            pool.launch(&spawner, &store, job.clone(), T0).await.unwrap();
        }

        store.fail_next_writes(1);
        let err = pool.reap(&store, true, T1).await.unwrap_err();

        assert!(matches!(err, StoreError::Backend(_)));
        assert!(pool.is_empty());
        let done = jobs
            .iter()
            .filter(|job| store.inner.job(&job.id).unwrap().status == JobStatus::Done)
            .count();
        assert_eq!(done, 2);
    }
}
