use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, fmt::time::OffsetTime, layer::Layered, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type Filtered = Layered<EnvFilter, Registry>;

/// Install the subscriber for `cfg`, stamping events in `offset`.
pub(crate) fn install(cfg: &LoggerConfig, offset: UtcOffset) -> Result<(), LoggerError> {
    if tracing::dispatcher::has_been_set() {
        return Err(LoggerError::AlreadyInstalled);
    }

    let base = tracing_subscriber::registry().with(filter(&cfg.level)?);
    let timer = OffsetTime::new(offset, Rfc3339);
    let installed = match cfg.format {
        LoggerFormat::Text => base
            .with(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_timer(timer),
            )
            .try_init(),
        LoggerFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(cfg.with_targets)
                    .with_timer(timer),
            )
            .try_init(),
        LoggerFormat::Journald => return journald(base),
    };
    installed.map_err(|e| LoggerError::Setup(e.to_string()))
}

fn filter(directive: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directive).map_err(|e| LoggerError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald(base: Filtered) -> Result<(), LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Setup(format!("journald: {e}")))?
        .with_syslog_identifier("crontabd".to_string());
    base.with(layer)
        .try_init()
        .map_err(|e| LoggerError::Setup(e.to_string()))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald(_base: Filtered) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
