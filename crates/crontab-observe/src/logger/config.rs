use std::io::IsTerminal;

use serde::Deserialize;

use crate::logger::format::LoggerFormat;

/// Logger settings, usually read from the `[logger]` table of the worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `info,crontab.job.output=warn`.
    pub level: String,
    pub with_targets: bool,
    #[serde(skip)]
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: LoggerConfig = toml::from_str(r#"level = "debug""#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "debug");
        assert!(cfg.with_targets);
    }

    #[test]
    fn format_is_validated() {
        let cfg: LoggerConfig = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert!(toml::from_str::<LoggerConfig>(r#"format = "carrier-pigeon""#).is_err());
    }
}
