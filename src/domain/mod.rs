//! Domain types for actionkit.
//!
//! This module contains the core data structures:
//! - Field: Inbound/outbound field contracts
//! - ExecutionState: Per-invocation state and outcome classification
//! - Callbacks: Outcome callbacks and messages
//! - Errors: Exception, failure and definition errors
//! - Events: Lifecycle notifications
//! - Retry: Async delivery metadata and reporting modes

pub mod callbacks;
pub mod error;
pub mod events;
pub mod field;
pub mod retry;
pub mod state;

// Re-export commonly used types
pub use callbacks::{CallbackScope, EventKind, MessageEntry};
pub use error::{ActionError, DefinitionError, Failure, Halt, ValidationErrors, Violation};
pub use events::{LifecycleEvent, LifecycleKind};
pub use field::{DefaultScope, Direction, Field, Rule, ValueKind};
pub use retry::{ReportMode, RetryRecord};
pub use state::{Classification, ExecutionState, Outcome};
