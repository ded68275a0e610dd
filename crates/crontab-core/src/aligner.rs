//! Step-boundary alignment of loop iterations.
use std::time::Duration;

use time::{OffsetDateTime, UtcOffset};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{
    config::WorkerConfig,
    pool::ProcessPool,
    process::ProcessHandle,
    store::{JobStore, StoreError},
};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Real time, expressed in a fixed offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// First step boundary strictly after `last`.
///
/// Seconds within the minute are rounded up to the next multiple of `step`, counted from
/// the start of the minute; sub-second precision is dropped. With the default step of 60
/// this is the start of the next minute.
pub fn next_boundary(last: OffsetDateTime, step: u32) -> OffsetDateTime {
    let step = step.max(1);
    let second = u32::from(last.second());
    let rounded = (second + step) / step * step;

    // nanosecond() < 1e9 always fits.
    let minute_start = last - time::Duration::new(i64::from(second), last.nanosecond() as i32);
    minute_start + time::Duration::seconds(i64::from(rounded))
}

/// Waits for the next boundary while keeping the pool serviced.
#[derive(Debug, Clone)]
pub struct TimeAligner {
    step: u32,
    sleep: Duration,
}

impl TimeAligner {
    pub fn new(step: u32, sleep: Duration) -> Self {
        Self { step, sleep }
    }

    pub fn from_config(cfg: &WorkerConfig) -> Self {
        Self::new(cfg.worker_step, cfg.sleep())
    }

    #[inline]
    pub fn next_boundary(&self, last: OffsetDateTime) -> OffsetDateTime {
        next_boundary(last, self.step)
    }

    /// Block until the boundary after `last`, returning it.
    ///
    /// Every pass drains output and finalizes terminated processes, then sleeps for the
    /// remaining time capped at the configured sleep. Only the sleep is cut short by
    /// `shutdown`, in which case `None` is returned.
    pub async fn advance<H, C>(
        &self,
        last: OffsetDateTime,
        clock: &C,
        pool: &mut ProcessPool<H>,
        store: &dyn JobStore,
        shutdown: &CancellationToken,
    ) -> Result<Option<OffsetDateTime>, StoreError>
    where
        H: ProcessHandle,
        C: Clock + ?Sized,
    {
        let next = self.next_boundary(last);
        loop {
            let now = clock.now();
            if now >= next {
                break;
            }

            pool.drain_output();
            pool.reap(store, false, now).await?;

            let remaining = (next - now).unsigned_abs();
            let nap = remaining.min(self.sleep);
            trace!(?nap, %next, "waiting for next boundary");
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(nap) => {}
            }
        }
        Ok(Some(next))
    }
}
