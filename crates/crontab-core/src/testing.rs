//! Fakes shared by the unit tests of this crate.
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use time::{OffsetDateTime, UtcOffset};

use crontab_model::{Job, JobId, JobType, NewJob};

use crate::{
    aligner::Clock,
    process::{LaunchError, OutputLine, ProcessHandle, Spawner},
    store::{FileJobStore, JobStore, StoreError},
};

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    pids: Vec<u32>,
    terminated: HashSet<u32>,
    output: HashMap<u32, Vec<OutputLine>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    spawned: Vec<String>,
}

/// Spawner whose processes live until the test terminates them.
#[derive(Clone)]
pub struct FakeSpawner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                next_pid: 1000,
                ..Default::default()
            })),
        }
    }

    pub fn fail_on(&self, command_line: &str) {
        self.state.lock().unwrap().failing.insert(command_line.to_string());
    }

    /// Make spawning `command_line` panic.
    pub fn panic_on(&self, command_line: &str) {
        self.state
            .lock()
            .unwrap()
            .panicking
            .insert(command_line.to_string());
    }

    pub fn terminate(&self, pid: u32) {
        self.state.lock().unwrap().terminated.insert(pid);
    }

    pub fn terminate_all(&self) {
        let mut state = self.state.lock().unwrap();
        let pids = state.pids.clone();
        state.terminated.extend(pids);
    }

    pub fn push_output(&self, pid: u32, line: OutputLine) {
        self.state
            .lock()
            .unwrap()
            .output
            .entry(pid)
            .or_default()
            .push(line);
    }

    pub fn pending_output(&self, pid: u32) -> usize {
        self.state
            .lock()
            .unwrap()
            .output
            .get(&pid)
            .map_or(0, Vec::len)
    }

    /// Command lines of every successful spawn, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.state.lock().unwrap().spawned.clone()
    }
}

impl Spawner for FakeSpawner {
    type Handle = FakeProcess;

    fn spawn(&self, command_line: &str) -> Result<FakeProcess, LaunchError> {
        if self.state.lock().unwrap().panicking.contains(command_line) {
            panic!("spawner blew up on {command_line}");
        }
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(command_line) {
            return Err(LaunchError::Spawn("no such file or directory".into()));
        }

        state.next_pid += 1;
        let pid = state.next_pid;
        state.pids.push(pid);
        state.spawned.push(command_line.to_string());

        Ok(FakeProcess {
            pid,
            command_line: command_line.to_string(),
            state: Arc::clone(&self.state),
        })
    }
}

pub struct FakeProcess {
    pid: u32,
    command_line: String,
    state: Arc<Mutex<FakeState>>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn command_line(&self) -> &str {
        &self.command_line
    }

    fn is_terminated(&mut self) -> bool {
        self.state.lock().unwrap().terminated.contains(&self.pid)
    }

    fn exit_code(&self) -> Option<i32> {
        self.state
            .lock()
            .unwrap()
            .terminated
            .contains(&self.pid)
            .then_some(0)
    }

    fn take_output(&mut self) -> Vec<OutputLine> {
        self.state
            .lock()
            .unwrap()
            .output
            .remove(&self.pid)
            .unwrap_or_default()
    }
}

/// Wall clock driven by tokio's (pausable) clock.
pub struct PausedClock {
    base: OffsetDateTime,
    start: tokio::time::Instant,
}

impl PausedClock {
    pub fn starting_at(base: OffsetDateTime) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for PausedClock {
    fn now(&self) -> OffsetDateTime {
        self.base + (tokio::time::Instant::now() - self.start)
    }
}

/// Store whose writes can be made slow or switched to fail.
pub struct FlakyStore {
    pub inner: FileJobStore,
    failures_left: AtomicUsize,
    write_delay: Option<Duration>,
}

impl FlakyStore {
    pub fn new(inner: FileJobStore) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(0),
            write_delay: None,
        }
    }

    /// Every write takes `delay` of tokio time before it lands.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn fail_writes(&self) {
        self.fail_next_writes(usize::MAX);
    }

    pub fn fail_next_writes(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn due_jobs(&self, job_type: &JobType) -> Result<Vec<Job>, StoreError> {
        self.inner.due_jobs(job_type).await
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        self.inner.get_job(id).await
    }

    async fn set_job(&self, id: &JobId, job: &Job) -> Result<bool, StoreError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Backend("database is read-only".into()));
        }
        self.inner.set_job(id, job).await
    }
}

/// In-memory store holding one every-minute job per command.
pub fn store_with(commands: &[&str]) -> (FileJobStore, Vec<Job>) {
    let store = FileJobStore::in_memory(UtcOffset::UTC);
    let jobs = commands
        .iter()
        .map(|command| {
            store
                .insert_job(NewJob {
                    expression: "* * * * *".parse().unwrap(),
                    command: command.to_string(),
                    job_type: JobType::default(),
                    active: true,
                    comment: None,
                })
                .unwrap()
        })
        .collect();
    (store, jobs)
}
