//! Background job execution for actions.
//!
//! A backend delivers an action invocation one or more times. Each delivery
//! runs with a fresh `RetryRecord` installed as the current retry scope, so
//! the exception boundary can decide whether that attempt gets reported.
//!
//! Only exceptions are retried; a business failure is a settled answer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{self, Settings};
use crate::core::{retry, ActionDef, ResultView};
use crate::domain::{Outcome, RetryRecord};

/// Adapter name recorded on retry records from `InlineBackend`
pub const INLINE_ADAPTER: &str = "inline";

/// Retry policy with exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately; handy for tests and demos
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Whether a failed `attempt` may be followed by another one
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

/// What happened on one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptReport {
    pub attempt: u32,
    pub outcome: Outcome,
    /// Whether the exception passed the retry gate
    pub reported: bool,
}

/// Result of running an action as a job
#[derive(Debug)]
pub struct JobReport {
    pub job_id: Uuid,
    pub attempts: Vec<AttemptReport>,
    /// Result of the last attempt
    pub result: ResultView,
}

impl JobReport {
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }
}

/// Trait for job backends
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Run `action` as a job, retrying per the backend's policy
    async fn perform(&self, action: &ActionDef, inputs: HashMap<String, Value>) -> JobReport;
}

/// Runs jobs on the calling task
#[derive(Debug, Clone, Default)]
pub struct InlineBackend {
    policy: RetryPolicy,
    settings: Option<Arc<Settings>>,
}

impl InlineBackend {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            settings: None,
        }
    }

    /// Use explicit settings instead of the process-wide ones
    pub fn with_settings(mut self, settings: Arc<Settings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl JobBackend for InlineBackend {
    fn name(&self) -> &str {
        INLINE_ADAPTER
    }

    async fn perform(&self, action: &ActionDef, inputs: HashMap<String, Value>) -> JobReport {
        let settings = self.settings.clone().unwrap_or_else(config::settings);
        let job_id = Uuid::new_v4();
        let mut record = RetryRecord::first(INLINE_ADAPTER, self.policy.max_retries)
            .with_job_id(job_id.to_string());
        let mut attempts = Vec::new();

        loop {
            let result = retry::with_record(record.clone(), || {
                action.run_with(&settings, inputs.clone())
            });

            let outcome = result.outcome();
            let reported = outcome == Outcome::ExceptionRaised
                && retry::gate(
                    action.report_mode(),
                    Some(&record),
                    settings.default_report_mode,
                );
            attempts.push(AttemptReport {
                attempt: record.attempt(),
                outcome,
                reported,
            });

            if outcome != Outcome::ExceptionRaised || !self.policy.should_retry(record.attempt()) {
                info!(
                    job_id = %job_id,
                    action = %action.name(),
                    attempts = attempts.len(),
                    outcome = %outcome,
                    "Job finished"
                );
                return JobReport {
                    job_id,
                    attempts,
                    result,
                };
            }

            let delay = self.policy.delay_for_attempt(record.attempt());
            debug!(
                job_id = %job_id,
                action = %action.name(),
                attempt = record.attempt(),
                delay_ms = delay.as_millis() as u64,
                "Retrying job after exception"
            );
            tokio::time::sleep(delay).await;
            record = record.next_attempt();
        }
    }
}
