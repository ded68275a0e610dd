use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

const DEFAULT_TYPE: &str = "single";

/// Concurrency class of a job.
///
/// Every worker instance services exactly one class; jobs of other classes are invisible to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobType(String);

impl JobType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobType {
    fn default() -> Self {
        Self(DEFAULT_TYPE.to_string())
    }
}

impl FromStr for JobType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        let valid = !norm.is_empty()
            && norm
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ModelError::InvalidJobType(s.to_string()));
        }
        Ok(Self(norm))
    }
}

impl TryFrom<String> for JobType {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<JobType> for String {
    fn from(t: JobType) -> Self {
        t.0
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
