use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crontab_core::WorkerConfig;
use crontab_observe::LoggerConfig;

/// Contents of `crontab.toml`. Every table and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrontabConfig {
    pub worker: WorkerConfig,
    pub logger: LoggerConfig,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON file holding the jobs.
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("jobs.json"),
        }
    }
}

impl CrontabConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.worker.validate()?;
        Ok(cfg)
    }
}
