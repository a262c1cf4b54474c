//! Error taxonomy for action execution.
//!
//! Two families live here:
//! - `ActionError`: anything classified as an exception outcome
//! - `Halt`: the signal type returned by work and hooks, which is either a
//!   business failure or an `ActionError`
//!
//! `DefinitionError` is separate because it is raised while building an
//! action definition, never while running one.

use std::fmt;

use thiserror::Error;

use super::field::Direction;

/// Placeholder used when a business failure carries no message.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Execution was halted";

/// A single rule violation on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Every violation found in one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Names of the violated fields, in the order they were checked
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for violation in &self.violations {
            if !fields.contains(&violation.field.as_str()) {
                fields.push(&violation.field);
            }
        }
        fields
    }

    /// Whether any violation concerns `field`
    pub fn contains(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        f.write_str(&joined.join("; "))
    }
}

/// Errors that classify an invocation as `ExceptionRaised`
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Failed to preprocess field `{field}`: {source}")]
    Preprocessing {
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to assign default for field `{field}`: {source}")]
    DefaultAssignment {
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Inbound validation failed: {0}")]
    InboundValidation(ValidationErrors),

    #[error("Outbound validation failed: {0}")]
    OutboundValidation(ValidationErrors),

    #[error("Action `{action}` does not declare {direction} field `{field}`")]
    UndeclaredField {
        action: String,
        field: String,
        direction: Direction,
    },

    #[error("Field `{field}` has an unexpected type: {source}")]
    FieldType {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Action panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Unhandled(anyhow::Error),
}

impl ActionError {
    /// Wrap an arbitrary error as an unclassified exception
    pub fn unhandled(error: impl Into<anyhow::Error>) -> Self {
        let error = error.into();
        match error.downcast::<ActionError>() {
            Ok(inner) => inner,
            Err(other) => Self::Unhandled(other),
        }
    }

    /// Borrow the wrapped error as `T` when this is an unclassified exception
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Unhandled(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// True for contract failures (preprocessing, defaults, validation)
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Self::Preprocessing { .. }
                | Self::DefaultAssignment { .. }
                | Self::InboundValidation(_)
                | Self::OutboundValidation(_)
        )
    }

    /// Validation details, if this is a validation failure in either direction
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::InboundValidation(errors) | Self::OutboundValidation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// An expected, user-signaled failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    message: Option<String>,
    origin: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: (!message.is_empty()).then_some(message),
            origin: None,
        }
    }

    /// A failure without a message
    pub fn silent() -> Self {
        Self::default()
    }

    /// The user message, if one was given and non-empty
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Name of the nested action that first raised this failure
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub(crate) fn attribute_to(&mut self, action: &str) {
        if self.origin.is_none() {
            self.origin = Some(action.to_string());
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or(DEFAULT_FAILURE_MESSAGE))
    }
}

impl std::error::Error for Failure {}

/// Signal that stops work or a hook before it completes normally.
///
/// Any `std::error::Error` converts into `Halt::Exception` through `?`.
/// `Halt` deliberately does not implement `std::error::Error` so that the
/// blanket conversion stays coherent; use [`Halt::into_error`] at the
/// outermost caller.
#[derive(Debug)]
pub enum Halt {
    Failure(Failure),
    Exception(ActionError),
}

impl Halt {
    /// Business failure with a user-facing message
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(message))
    }

    /// Halt from any error value, `anyhow::Error` included.
    ///
    /// A wrapped `Failure` stays a business failure; everything else is an
    /// exception.
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        match error.into().downcast::<Failure>() {
            Ok(failure) => Self::Failure(failure),
            Err(other) => Self::Exception(ActionError::unhandled(other)),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Convert into an `anyhow::Error`, keeping the original error chain
    pub fn into_error(self) -> anyhow::Error {
        match self {
            Self::Failure(failure) => anyhow::Error::new(failure),
            Self::Exception(ActionError::Unhandled(inner)) => inner,
            Self::Exception(other) => anyhow::Error::new(other),
        }
    }
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(failure) => write!(f, "{}", failure),
            Self::Exception(error) => write!(f, "{}", error),
        }
    }
}

impl<E> From<E> for Halt
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::error(error)
    }
}

/// Errors raised while building an action definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Action name cannot be empty")]
    EmptyName,

    #[error("Action `{action}` declares {direction} field `{field}` more than once")]
    DuplicateField {
        action: String,
        field: String,
        direction: Direction,
    },

    #[error("Action `{action}` has no work function")]
    MissingWork { action: String },
}

/// A retry record was built with an attempt number below 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Retry attempt must be at least 1, got {0}")]
pub struct InvalidAttempt(pub u32);
