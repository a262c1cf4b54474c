//! Read-only view of a settled invocation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::callbacks::resolve_message;
use crate::domain::error::DEFAULT_FAILURE_MESSAGE;
use crate::domain::{
    ActionError, CallbackScope, Classification, Direction, EventKind, ExecutionState, Failure,
    Halt, Outcome,
};

use super::action::ActionDef;
use super::context::NULL;

/// Error message used when no registered message applies
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong";

/// Success message used when no registered message applies
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Action completed successfully";

/// Outcome of `ActionDef::run`
#[derive(Debug)]
pub struct ResultView {
    action: String,
    declared_outputs: Vec<String>,
    state: ExecutionState,
    message: String,
}

impl ResultView {
    pub(crate) fn new(def: &ActionDef, state: ExecutionState) -> Self {
        let message = settle_message(def, &state);
        Self {
            action: def.name().to_string(),
            declared_outputs: def.outputs().iter().map(|f| f.name().to_string()).collect(),
            state,
            message,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn ok(&self) -> bool {
        self.outcome() == Outcome::Success
    }

    pub fn outcome(&self) -> Outcome {
        self.state.outcome()
    }

    /// User-facing error message; `None` on success
    pub fn error(&self) -> Option<&str> {
        (!self.ok()).then_some(self.message.as_str())
    }

    /// User-facing success message; `None` otherwise
    pub fn success(&self) -> Option<&str> {
        self.ok().then_some(self.message.as_str())
    }

    /// Whichever of `success` or `error` applies
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exception(&self) -> Option<&ActionError> {
        self.state.exception()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.state.failure()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.state.elapsed_ms()
    }

    /// Whether the outbound contract completed
    pub fn is_finalized(&self) -> bool {
        self.state.is_finalized()
    }

    /// Value of a declared outbound field; `Null` when it was never set
    pub fn get(&self, name: &str) -> Result<&Value, ActionError> {
        if !self.declared_outputs.iter().any(|f| f == name) {
            return Err(ActionError::UndeclaredField {
                action: self.action.clone(),
                field: name.to_string(),
                direction: Direction::Outbound,
            });
        }
        Ok(self.state.exposed().get(name).unwrap_or(&NULL))
    }

    pub fn outputs(&self) -> &HashMap<String, Value> {
        self.state.exposed()
    }

    /// Serializable summary for logs and the CLI
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            action: self.action.clone(),
            ok: self.ok(),
            outcome: self.outcome(),
            message: self.message.clone(),
            exception: self.exception().map(|e| e.to_string()),
            elapsed_ms: self.elapsed_ms(),
            outputs: self.outputs().clone(),
        }
    }

    /// The halt that produced a non-ok result; a success yields an
    /// unhandled error describing the misuse.
    pub(crate) fn into_halt(self) -> Halt {
        match self.state.into_classification() {
            Classification::BusinessFailure(failure) => Halt::Failure(failure),
            Classification::Exception(error) => Halt::Exception(error),
            Classification::Unset | Classification::EarlySuccess(_) => Halt::error(anyhow::anyhow!(
                "Action `{}` succeeded; nothing to re-raise",
                self.action
            )),
        }
    }
}

/// Serializable projection of a `ResultView`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub action: String,
    pub ok: bool,
    pub outcome: Outcome,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    pub elapsed_ms: f64,
    pub outputs: HashMap<String, Value>,
}

fn settle_message(def: &ActionDef, state: &ExecutionState) -> String {
    let definition = def.definition();
    let retry = super::retry::current();
    let scope = CallbackScope {
        action: &definition.name,
        outcome: state.outcome(),
        inputs: state.provided(),
        outputs: state.exposed(),
        exception: state.exception(),
        failure: state.failure(),
        retry: retry.as_ref(),
    };

    match state.classification() {
        Classification::BusinessFailure(failure) => match failure.message() {
            Some(message) => message.to_string(),
            None => resolve_message(&definition.messages, EventKind::Error, &scope)
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
        },
        Classification::Exception(_) => {
            resolve_message(&definition.messages, EventKind::Error, &scope)
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())
        }
        Classification::EarlySuccess(Some(message)) if !message.is_empty() => message.clone(),
        Classification::EarlySuccess(_) | Classification::Unset => {
            resolve_message(&definition.messages, EventKind::Success, &scope)
                .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string())
        }
    }
}
