//! Core execution logic.
//!
//! This module contains:
//! - Action: definitions and the builder that produces them
//! - Contract: inbound/outbound field processing and validation
//! - Hooks: before/around/after composition around the work function
//! - Boundary: classification, callbacks and exception reporting
//! - Pipeline: the fixed phase order every invocation runs through
//! - Nesting/Retry: per-thread call depth and retry attempt tracking

pub mod action;
pub mod boundary;
pub mod context;
pub mod contract;
pub mod hooks;
pub mod nesting;
pub mod pipeline;
pub mod result;
pub mod retry;

// Re-export commonly used types
pub use action::{ActionBuilder, ActionDef};
pub use boundary::{ExceptionReporter, ReportContext};
pub use context::Context;
pub use hooks::{Flow, Next};
pub use nesting::NestingGuard;
pub use pipeline::{LifecycleSubscriber, MemorySubscriber};
pub use result::{ResultSummary, ResultView, DEFAULT_ERROR_MESSAGE, DEFAULT_SUCCESS_MESSAGE};
pub use retry::{should_report, RetryScope};
