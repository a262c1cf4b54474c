//! Async delivery metadata and exception reporting modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::InvalidAttempt;

/// When an exception raised inside a retrying job is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Report on every delivery attempt
    EveryAttempt,

    /// Report the first attempt and the one that exhausts retries
    FirstAndExhausted,

    /// Report only once retries are exhausted
    OnlyExhausted,
}

impl Default for ReportMode {
    fn default() -> Self {
        Self::FirstAndExhausted
    }
}

impl ReportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EveryAttempt => "every_attempt",
            Self::FirstAndExhausted => "first_and_exhausted",
            Self::OnlyExhausted => "only_exhausted",
        }
    }

    /// Decision for this mode alone
    pub fn should_report(&self, attempt: u32, max_retries: u32) -> bool {
        let exhausted = attempt > max_retries;
        match self {
            Self::EveryAttempt => true,
            Self::FirstAndExhausted => attempt == 1 || exhausted,
            Self::OnlyExhausted => exhausted,
        }
    }
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "every_attempt" => Ok(Self::EveryAttempt),
            "first_and_exhausted" => Ok(Self::FirstAndExhausted),
            "only_exhausted" => Ok(Self::OnlyExhausted),
            other => anyhow::bail!("Unknown report mode: {}", other),
        }
    }
}

/// Metadata for one delivery attempt of an async job.
///
/// Built fresh by the job backend for every attempt; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    adapter: String,
    attempt: u32,
    max_retries: u32,
    job_id: Option<String>,
}

impl RetryRecord {
    /// Create a record; `attempt` is 1-indexed
    pub fn new(
        adapter: impl Into<String>,
        attempt: u32,
        max_retries: u32,
    ) -> Result<Self, InvalidAttempt> {
        if attempt == 0 {
            return Err(InvalidAttempt(attempt));
        }
        Ok(Self {
            adapter: adapter.into(),
            attempt,
            max_retries,
            job_id: None,
        })
    }

    /// Record for the first delivery of a job
    pub fn first(adapter: impl Into<String>, max_retries: u32) -> Self {
        Self {
            adapter: adapter.into(),
            attempt: 1,
            max_retries,
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    /// Record for the following delivery attempt of the same job
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// True once this attempt is past the last allowed retry
    pub fn is_exhausted(&self) -> bool {
        self.attempt > self.max_retries
    }
}
