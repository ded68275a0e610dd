use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Upper bound for `worker_step`; one day.
const MAX_STEP_SECS: u32 = 86_400;

/// Worker tuning, read from the `[worker]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrency cap used by admission control unless `PROCESSES_LIMIT` overrides it.
    pub processes_limit: usize,
    /// Longest sleep between two drains while waiting for the next boundary, in seconds.
    ///
    /// Lower values mean more frequent output forwarding and more wake-ups.
    pub worker_sleep: u64,
    /// Boundary granularity in seconds. Keep the default of 60 to mimic cron.
    pub worker_step: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processes_limit: 1,
            worker_sleep: 5,
            worker_step: 60,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_sleep == 0 {
            return Err(ConfigError::ZeroSleep);
        }
        if self.worker_step == 0 || self.worker_step > MAX_STEP_SECS {
            return Err(ConfigError::InvalidStep {
                got: self.worker_step,
                max: MAX_STEP_SECS,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn sleep(&self) -> Duration {
        Duration::from_secs(self.worker_sleep)
    }
}
