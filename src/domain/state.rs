//! Per-invocation execution state.
//!
//! One `ExecutionState` exists per call to an action's pipeline. It is owned
//! by that call, mutated only inside the pipeline, and handed to the caller
//! as a read-only `ResultView` once the pipeline returns.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::error::{ActionError, Failure};

/// Terminal classification of an invocation
#[derive(Debug, Default)]
pub enum Classification {
    #[default]
    Unset,
    EarlySuccess(Option<String>),
    BusinessFailure(Failure),
    Exception(ActionError),
}

impl Classification {
    /// Failure and exception classifications are final
    pub fn is_final(&self) -> bool {
        matches!(self, Self::BusinessFailure(_) | Self::Exception(_))
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::EarlySuccess(_) => "early_success",
            Self::BusinessFailure(_) => "business_failure",
            Self::Exception(_) => "exception",
        }
    }
}

/// Three-way outcome derived from a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    ExceptionRaised,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::ExceptionRaised => "exception",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&Classification> for Outcome {
    fn from(classification: &Classification) -> Self {
        match classification {
            Classification::BusinessFailure(_) => Self::Failure,
            Classification::Exception(_) => Self::ExceptionRaised,
            Classification::Unset | Classification::EarlySuccess(_) => Self::Success,
        }
    }
}

/// Mutable record of a single invocation
#[derive(Debug, Default)]
pub struct ExecutionState {
    provided: HashMap<String, Value>,
    exposed: HashMap<String, Value>,
    classification: Classification,
    elapsed_ms: f64,
    finalized: bool,
}

impl ExecutionState {
    pub fn new(provided: HashMap<String, Value>) -> Self {
        Self {
            provided,
            ..Self::default()
        }
    }

    pub fn provided(&self) -> &HashMap<String, Value> {
        &self.provided
    }

    pub fn exposed(&self) -> &HashMap<String, Value> {
        &self.exposed
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from(&self.classification)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn exception(&self) -> Option<&ActionError> {
        match &self.classification {
            Classification::Exception(error) => Some(error),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.classification {
            Classification::BusinessFailure(failure) => Some(failure),
            _ => None,
        }
    }

    pub(crate) fn provided_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.provided
    }

    pub(crate) fn exposed_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.exposed
    }

    /// Both maps at once, for copying inbound values into outputs
    pub(crate) fn split_mut(&mut self) -> (&HashMap<String, Value>, &mut HashMap<String, Value>) {
        (&self.provided, &mut self.exposed)
    }

    /// Record a classification. Returns false when a final one already exists.
    pub(crate) fn classify(&mut self, classification: Classification) -> bool {
        if self.classification.is_final() {
            debug!(
                kept = self.classification.label(),
                ignored = classification.label(),
                "Ignoring reclassification of settled invocation"
            );
            return false;
        }
        self.classification = classification;
        true
    }

    pub(crate) fn set_elapsed_ms(&mut self, elapsed_ms: f64) {
        self.elapsed_ms = elapsed_ms.max(0.0);
    }

    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }

    pub(crate) fn into_classification(self) -> Classification {
        self.classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_final_classification_wins() {
        let mut state = ExecutionState::default();
        assert!(state.classify(Classification::BusinessFailure(Failure::new("first"))));
        assert!(!state.classify(Classification::Exception(ActionError::Panicked(
            "later".to_string()
        ))));

        assert_eq!(state.outcome(), Outcome::Failure);
        assert_eq!(state.failure().and_then(|f| f.message()), Some("first"));
    }

    #[test]
    fn test_early_success_can_be_downgraded() {
        let mut state = ExecutionState::default();
        state.classify(Classification::EarlySuccess(None));
        assert_eq!(state.outcome(), Outcome::Success);

        assert!(state.classify(Classification::Exception(ActionError::Panicked(
            "outbound".to_string()
        ))));
        assert_eq!(state.outcome(), Outcome::ExceptionRaised);
    }

    #[test]
    fn test_elapsed_never_negative() {
        let mut state = ExecutionState::default();
        state.set_elapsed_ms(-3.0);
        assert_eq!(state.elapsed_ms(), 0.0);
    }
}
