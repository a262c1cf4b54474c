//! Lifecycle notifications emitted around every action invocation.
//!
//! Each invocation produces a `Started` event before any work and a
//! `Finished` event once the outcome has settled.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::state::Outcome;

/// A single lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// Identifier shared by the start and finish events of one invocation
    pub invocation_id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Name of the action being run
    pub action: String,

    /// Type of event
    pub kind: LifecycleKind,

    /// Number of enclosing action invocations
    pub depth: usize,

    /// Inputs as provided by the caller, sensitive fields filtered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<HashMap<String, Value>>,

    /// Settled outcome (finish events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    /// Time taken in milliseconds (finish events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,

    /// Error message if the outcome was not a success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LifecycleEvent {
    /// Create a start event with the current timestamp
    pub fn started(invocation_id: Uuid, action: impl Into<String>, depth: usize) -> Self {
        Self::new(invocation_id, action.into(), LifecycleKind::Started, depth)
    }

    /// Create a finish event with the current timestamp
    pub fn finished(
        invocation_id: Uuid,
        action: impl Into<String>,
        depth: usize,
        outcome: Outcome,
        elapsed_ms: f64,
    ) -> Self {
        let mut event = Self::new(invocation_id, action.into(), LifecycleKind::Finished, depth);
        event.outcome = Some(outcome);
        event.elapsed_ms = Some(elapsed_ms);
        event
    }

    fn new(invocation_id: Uuid, action: String, kind: LifecycleKind, depth: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            invocation_id,
            timestamp: Utc::now(),
            action,
            kind,
            depth,
            inputs: None,
            outcome: None,
            elapsed_ms: None,
            error: None,
        }
    }

    /// Attach (already filtered) inputs
    pub fn with_inputs(mut self, inputs: HashMap<String, Value>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    /// The pipeline was entered
    Started,

    /// The pipeline returned with a settled outcome
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let invocation = Uuid::new_v4();
        let event = LifecycleEvent::finished(invocation, "Greet", 1, Outcome::Failure, 12.5)
            .with_error("Name taken".to_string());

        let json = serde_json::to_string(&event).unwrap();
        let parsed: LifecycleEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.invocation_id, invocation);
        assert_eq!(parsed.kind, LifecycleKind::Finished);
        assert_eq!(parsed.outcome, Some(Outcome::Failure));
        assert_eq!(parsed.error.as_deref(), Some("Name taken"));
        assert!(!json.contains("\"inputs\""));
    }

    #[test]
    fn test_started_has_no_outcome() {
        let event = LifecycleEvent::started(Uuid::new_v4(), "Greet", 0);
        assert_eq!(event.kind, LifecycleKind::Started);
        assert!(event.outcome.is_none());
        assert!(event.elapsed_ms.is_none());
    }
}
