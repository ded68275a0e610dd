use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::SystemTime,
};

use async_trait::async_trait;
use time::{OffsetDateTime, UtcOffset};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, trace};

use crontab_model::{Job, JobId, JobPatch, JobType, NewJob};

use crate::store::{JobStore, StoreError};

/// Job store kept in memory and mirrored to a JSON file after every mutation.
///
/// The file is re-read whenever its modification time or size differs from what was last seen, so
/// jobs edited by another process (the management commands, typically) are picked up by a
/// running worker before its next read or write.
///
/// Schedules are evaluated in the store's UTC offset, so `0 3 * * *` means 03:00 local time
/// when the store is opened with the local offset. The offset is fixed for the store's
/// lifetime: after a daylight-saving change a long-running worker keeps evaluating in the
/// old offset, one hour off, until it is restarted.
///
/// File I/O is synchronous. Through [`JobStore`] on a multi-thread runtime it runs inside
/// [`tokio::task::block_in_place`]; elsewhere it blocks the calling task.
pub struct FileJobStore {
    path: Option<PathBuf>,
    offset: UtcOffset,
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, Job>,
    /// Index: job type -> ids of the jobs of that type.
    by_type: HashMap<JobType, Vec<JobId>>,
    /// Fingerprint of the file when it was last read or written.
    seen: Option<Fingerprint>,
}

impl StoreInner {
    fn load(path: &Path) -> Result<Self, StoreError> {
        let mut inner = StoreInner {
            seen: fingerprint(path)?,
            ..Default::default()
        };

        match fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => {
                let jobs: Vec<Job> =
                    serde_json::from_str(&content).map_err(|source| StoreError::Serde {
                        path: path.to_path_buf(),
                        source,
                    })?;
                for job in jobs {
                    inner.insert(job);
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        Ok(inner)
    }

    fn insert(&mut self, job: Job) {
        if let Some(old) = self.jobs.remove(&job.id) {
            self.unindex(&old.id, &old.job_type);
        }
        self.by_type
            .entry(job.job_type.clone())
            .or_default()
            .push(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    fn remove(&mut self, id: &JobId) -> Option<Job> {
        let job = self.jobs.remove(id)?;
        self.unindex(id, &job.job_type);
        Some(job)
    }

    fn unindex(&mut self, id: &JobId, job_type: &JobType) {
        if let Some(ids) = self.by_type.get_mut(job_type) {
            ids.retain(|other| other != id);
        }
    }

    fn sorted(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        jobs
    }
}

/// Modification time and length of a file.
type Fingerprint = (SystemTime, u64);

/// `None` when the file does not exist.
fn fingerprint(path: &Path) -> Result<Option<Fingerprint>, StoreError> {
    match fs::metadata(path).and_then(|meta| Ok((meta.modified()?, meta.len()))) {
        Ok(print) => Ok(Some(print)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl FileJobStore {
    /// Store without a backing file.
    pub fn in_memory(offset: UtcOffset) -> Self {
        Self {
            path: None,
            offset,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Open the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, offset: UtcOffset) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = StoreInner::load(&path)?;

        debug!(path = %path.display(), jobs = inner.jobs.len(), "job store opened");
        Ok(Self {
            path: Some(path),
            offset,
            inner: Mutex::new(inner),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current time in the store's offset.
    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.lock()?.sorted())
    }

    pub fn job(&self, id: &JobId) -> Result<Job, StoreError> {
        self.lock()?
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn insert_job(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.lock()?;
        let mut id = JobId::generate();
        while inner.jobs.contains_key(&id) {
            id = JobId::generate();
        }

        let job = Job::new(new, id, self.now());
        inner.insert(job.clone());
        self.persist(&mut inner)?;

        debug!(job_id = %job.id, "job inserted");
        Ok(job)
    }

    /// Apply `patch` to the job. `Ok(false)` when the patch changed nothing.
    pub fn update_job(&self, id: &JobId, patch: JobPatch) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let mut job = inner
            .jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !job.apply(patch, self.now()) {
            return Ok(false);
        }
        inner.insert(job);
        self.persist(&mut inner)?;
        Ok(true)
    }

    pub fn delete_job(&self, id: &JobId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&mut inner)?;
        debug!(job_id = %id, "job deleted");
        Ok(true)
    }

    /// Replace the stored job with id `id`; unknown ids are left alone.
    pub fn put(&self, id: &JobId, job: &Job) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if !inner.jobs.contains_key(id) {
            return Ok(false);
        }

        let mut job = job.clone();
        job.id = id.clone();
        inner.insert(job);
        self.persist(&mut inner)?;
        Ok(true)
    }

    /// Active jobs of `job_type` whose schedule matches the minute containing `at`.
    pub fn due_jobs_at(
        &self,
        job_type: &JobType,
        at: OffsetDateTime,
    ) -> Result<Vec<Job>, StoreError> {
        let at = at.to_offset(self.offset);
        let inner = self.lock()?;

        let due: Vec<Job> = inner
            .by_type
            .get(job_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.jobs.get(id))
                    .filter(|job| job.active && job.expression.matches(at))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        trace!(job_type = %job_type, due = due.len(), "due jobs evaluated");
        Ok(due)
    }

    /// Lock the state, reloading it first when the file changed underneath.
    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(path) = &self.path {
            let seen = fingerprint(path)?;
            if seen != inner.seen {
                *inner = StoreInner::load(path)?;
                debug!(path = %path.display(), jobs = inner.jobs.len(), "job store reloaded");
            }
        }
        Ok(inner)
    }

    fn persist(&self, inner: &mut StoreInner) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json =
            serde_json::to_string_pretty(&inner.sorted()).map_err(|source| StoreError::Serde {
                path: path.clone(),
                source,
            })?;

        let tmp = path.with_extension("tmp");
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        inner.seen = fingerprint(path)?;
        Ok(())
    }
}

/// Run `f` without stalling the other tasks of a multi-thread runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn due_jobs(&self, job_type: &JobType) -> Result<Vec<Job>, StoreError> {
        blocking(|| self.due_jobs_at(job_type, self.now()))
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        blocking(|| self.job(id))
    }

    async fn set_job(&self, id: &JobId, job: &Job) -> Result<bool, StoreError> {
        blocking(|| self.put(id, job))
    }
}
