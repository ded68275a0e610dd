mod config;
mod error;
mod format;
mod log;

use time::UtcOffset;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Install the global `tracing` subscriber described by `cfg`.
///
/// Event timestamps use `offset`, the same offset the worker schedules in.
/// Fails with [`LoggerError::AlreadyInstalled`] when a global subscriber is already set.
pub fn logger_init(cfg: &LoggerConfig, offset: UtcOffset) -> Result<(), LoggerError> {
    log::install(cfg, offset)
}

/// Local UTC offset, falling back to UTC when it cannot be determined.
///
/// The offset can only be read reliably while the process is single-threaded, so call this
/// before starting the async runtime and pass the value along.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}
