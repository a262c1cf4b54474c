//! Outcome callbacks and message entries.
//!
//! Both are stored per action definition in declaration order. Callbacks
//! fire for every matching entry; messages resolve to the first match.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ActionError, Failure};
use super::retry::RetryRecord;
use super::state::Outcome;

/// Predicate deciding whether an entry applies to the current invocation
pub type Matcher = Arc<dyn Fn(&CallbackScope<'_>) -> bool + Send + Sync>;

/// Outcome callback body
pub type Handler = Arc<dyn Fn(&CallbackScope<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Computes a message from the settled invocation
pub type MessageFn = Arc<dyn Fn(&CallbackScope<'_>) -> anyhow::Result<String> + Send + Sync>;

/// Event a callback or message is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Success,
    /// Any non-success outcome, business failure or exception
    Error,
    Failure,
    Exception,
}

/// Read-only view of a settled invocation, passed to callbacks and messages
#[derive(Debug, Clone, Copy)]
pub struct CallbackScope<'a> {
    pub action: &'a str,
    pub outcome: Outcome,
    pub inputs: &'a HashMap<String, Value>,
    pub outputs: &'a HashMap<String, Value>,
    pub exception: Option<&'a ActionError>,
    pub failure: Option<&'a Failure>,
    pub retry: Option<&'a RetryRecord>,
}

impl CallbackScope<'_> {
    /// True when the captured exception wraps an error of type `T`
    pub fn exception_is<T>(&self) -> bool
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.exception
            .and_then(|e| e.downcast_ref::<T>())
            .is_some()
    }
}

/// One registered outcome callback
#[derive(Clone)]
pub struct Callback {
    pub kind: EventKind,
    pub matcher: Option<Matcher>,
    pub handler: Handler,
    pub order: usize,
}

impl Callback {
    pub fn applies(&self, scope: &CallbackScope<'_>) -> bool {
        matches_scope(self.matcher.as_ref(), scope)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("kind", &self.kind)
            .field("conditional", &self.matcher.is_some())
            .field("order", &self.order)
            .finish()
    }
}

/// Static text or a function producing it
#[derive(Clone)]
pub enum MessageSource {
    Static(String),
    Dynamic(MessageFn),
}

/// One registered success or error message
#[derive(Clone)]
pub struct MessageEntry {
    pub kind: EventKind,
    pub matcher: Option<Matcher>,
    pub source: MessageSource,
    pub order: usize,
}

impl fmt::Debug for MessageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            MessageSource::Static(text) => text.as_str(),
            MessageSource::Dynamic(_) => "<dynamic>",
        };
        f.debug_struct("MessageEntry")
            .field("kind", &self.kind)
            .field("conditional", &self.matcher.is_some())
            .field("source", &source)
            .field("order", &self.order)
            .finish()
    }
}

/// First message of `kind`, in declaration order, whose matcher is absent or true.
///
/// Dynamic messages that fail are skipped so the next entry gets a chance.
pub fn resolve_message(
    entries: &[MessageEntry],
    kind: EventKind,
    scope: &CallbackScope<'_>,
) -> Option<String> {
    let mut candidates: Vec<&MessageEntry> = entries.iter().filter(|e| e.kind == kind).collect();
    candidates.sort_by_key(|e| e.order);

    for entry in candidates {
        if !matches_scope(entry.matcher.as_ref(), scope) {
            continue;
        }
        match &entry.source {
            MessageSource::Static(text) => return Some(text.clone()),
            MessageSource::Dynamic(compute) => {
                match contain_panic(scope.action, "message", || compute(scope)) {
                    Some(Ok(text)) => return Some(text),
                    Some(Err(e)) => {
                        tracing::warn!(action = scope.action, error = %e, "Message handler failed, trying next entry");
                    }
                    None => {}
                }
            }
        }
    }

    None
}

/// A missing matcher always matches; a panicking one never does
fn matches_scope(matcher: Option<&Matcher>, scope: &CallbackScope<'_>) -> bool {
    match matcher {
        Some(matcher) => contain_panic(scope.action, "matcher", || matcher(scope)).unwrap_or(false),
        None => true,
    }
}

/// Run user-supplied code, turning a panic into `None` and a warning
pub(crate) fn contain_panic<T>(action: &str, what: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::warn!(action, what, panic = %panic_message(payload.as_ref()), "User code panicked");
            None
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
