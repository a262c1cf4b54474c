//! actionkit - Contract-checked units of work with a fixed execution pipeline
//!
//! An action declares the fields it accepts and exposes, optional lifecycle
//! hooks, outcome callbacks and messages, and a work function. Every run goes
//! through the same pipeline and yields a `ResultView`; it never panics or
//! returns an error to the caller.
//!
//! # Architecture
//!
//! The pipeline is split into two zones:
//! - Outside: nesting depth, tracing span, logging, timing
//! - Inside: inbound contract, hooks and work, outbound contract
//!
//! Everything inside is caught at a single boundary and classified as a
//! success, a business failure or an exception. Exceptions are forwarded to
//! an optional reporter, gated by the current job's retry attempt.
//!
//! # Modules
//!
//! - `core`: Execution logic (actions, contract, hooks, pipeline, retry gate)
//! - `domain`: Data structures (fields, errors, state, callbacks, events)
//! - `config`: Process-wide settings
//! - `jobs`: In-process job backend with retries
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the sample action
//! actionkit greet --name Ada
//!
//! # Would attempt 2 of 4 be reported?
//! actionkit gate --mode first_and_exhausted --attempt 2 --max-retries 3
//! ```

use std::collections::HashMap;

use serde_json::Value;

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod jobs;

// Re-export main types at crate root for convenience
pub use crate::config::Settings;
pub use crate::core::{
    ActionBuilder, ActionDef, Context, ExceptionReporter, Flow, LifecycleSubscriber,
    MemorySubscriber, Next, ReportContext, ResultView,
};
pub use crate::domain::{
    ActionError, EventKind, Failure, Field, Halt, Outcome, ReportMode, RetryRecord, Rule,
    ValueKind,
};
pub use crate::jobs::{InlineBackend, JobBackend, RetryPolicy};

/// Turn a JSON object into an input map; anything else yields an empty map
pub fn values(value: Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}
