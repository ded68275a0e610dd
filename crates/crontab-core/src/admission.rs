//! Admission control for new processes.
//!
//! While the pool holds fewer processes than the effective limit every launch is admitted.
//! Once it is at (or over) the limit, a launch is refused only when a process with the exact
//! same command line is already running; distinct commands still get through. The limit
//! therefore caps concurrent copies of one command rather than the pool size.
use std::{fmt, sync::Arc};

use tracing::warn;

use crate::{pool::ProcessPool, process::ProcessHandle};

/// Environment variable overriding the configured limit, re-read on every check.
pub const LIMIT_ENV: &str = "PROCESSES_LIMIT";

type OverrideSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct Admission {
    configured: usize,
    override_source: OverrideSource,
}

impl Admission {
    /// Admission with `configured` as limit and [`LIMIT_ENV`] as override.
    pub fn new(configured: usize) -> Self {
        Self {
            configured,
            override_source: Arc::new(|| std::env::var(LIMIT_ENV).ok()),
        }
    }

    /// Read the override from somewhere other than the process environment.
    pub fn with_override_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.override_source = Arc::new(source);
        self
    }

    /// Effective limit right now.
    pub fn limit(&self) -> usize {
        resolve_limit(self.configured, (self.override_source)().as_deref())
    }

    pub fn can_launch<H: ProcessHandle>(&self, pool: &ProcessPool<H>, command_line: &str) -> bool {
        if pool.len() < self.limit() {
            return true;
        }
        !pool.is_running(command_line)
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

/// Pick the override when it is set, non-empty and non-zero, else the configured limit.
pub fn resolve_limit(configured: usize, env: Option<&str>) -> usize {
    let Some(raw) = env.map(str::trim).filter(|v| !v.is_empty() && *v != "0") else {
        return configured;
    };
    match raw.parse::<usize>() {
        Ok(limit) => limit,
        Err(_) => {
            warn!(value = raw, configured, "ignoring unparsable {LIMIT_ENV}");
            configured
        }
    }
}
