//! The single rescue point for an invocation.
//!
//! Everything that may fail (contract application, hooks and work) runs
//! here. Failures are classified into the execution state, never returned,
//! and the matching callbacks and the global exception reporter are
//! dispatched once the classification has settled.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::domain::callbacks::{contain_panic, panic_message};
use crate::domain::field::filter_sensitive;
use crate::domain::{
    ActionError, CallbackScope, Classification, EventKind, ExecutionState, Halt, RetryRecord,
};

use super::action::Definition;
use super::context::Context;
use super::hooks::{run_chain, Flow};
use super::retry;

/// What the reporter learns about the failing invocation
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub action: &'a str,
    /// Inputs with sensitive fields filtered
    pub inputs: HashMap<String, Value>,
    pub retry: Option<&'a RetryRecord>,
    pub depth: usize,
}

/// Process-wide sink for unclassified exceptions
pub trait ExceptionReporter: Send + Sync {
    fn report(&self, error: &ActionError, context: &ReportContext<'_>) -> anyhow::Result<()>;
}

impl<F> ExceptionReporter for F
where
    F: Fn(&ActionError, &ReportContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn report(&self, error: &ActionError, context: &ReportContext<'_>) -> anyhow::Result<()> {
        self(error, context)
    }
}

/// Run the inside zone of the pipeline and classify its result
pub(crate) fn run(
    def: &Definition,
    state: &mut ExecutionState,
    settings: &Settings,
    retry_record: Option<&RetryRecord>,
    depth: usize,
) {
    if let Err(error) = contained(|| super::contract::apply_inbound(def, state)) {
        debug!(action = %def.name, error = %error, "Inbound contract rejected invocation");
        state.classify(Classification::Exception(error));
        dispatch(def, state, settings, retry_record, depth);
        return;
    }

    let signal = contained(|| {
        let mut ctx = Context::new(def, state, retry_record, depth);
        run_chain(&def.before, &def.around, &def.after, &def.work, &mut ctx).map_err(Signal::Halt)
    });
    match signal {
        Ok(Flow::Continue) => {}
        Ok(Flow::Done(message)) => {
            state.classify(Classification::EarlySuccess(message));
        }
        Err(Signal::Halt(Halt::Failure(failure))) => {
            state.classify(Classification::BusinessFailure(failure));
        }
        Err(Signal::Halt(Halt::Exception(error))) | Err(Signal::Error(error)) => {
            state.classify(Classification::Exception(error));
        }
    }

    if let Err(error) = contained(|| super::contract::apply_outbound(def, state)) {
        if state.classification().is_final() {
            debug!(action = %def.name, error = %error, "Outbound contract failed after a settled failure");
        } else {
            state.classify(Classification::Exception(error));
        }
    }

    dispatch(def, state, settings, retry_record, depth);
}

/// Either a halt from work/hooks or a panic converted to an error
enum Signal {
    Halt(Halt),
    Error(ActionError),
}

impl From<ActionError> for Signal {
    fn from(error: ActionError) -> Self {
        Self::Error(error)
    }
}

/// Run `f`, converting a panic into `ActionError::Panicked`
fn contained<T, E>(f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
    E: From<ActionError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ActionError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

/// Fire callbacks for the settled classification, then report if gated in
fn dispatch(
    def: &Definition,
    state: &ExecutionState,
    settings: &Settings,
    retry_record: Option<&RetryRecord>,
    depth: usize,
) {
    let scope = CallbackScope {
        action: &def.name,
        outcome: state.outcome(),
        inputs: state.provided(),
        outputs: state.exposed(),
        exception: state.exception(),
        failure: state.failure(),
        retry: retry_record,
    };

    match state.classification() {
        Classification::Unset | Classification::EarlySuccess(_) => {
            fire(def, EventKind::Success, &scope);
        }
        Classification::BusinessFailure(_) => {
            fire(def, EventKind::Error, &scope);
            fire(def, EventKind::Failure, &scope);
        }
        Classification::Exception(error) => {
            fire(def, EventKind::Error, &scope);

            if !retry::gate(def.report_mode, retry_record, settings.default_report_mode) {
                debug!(
                    action = %def.name,
                    attempt = retry_record.map(|r| r.attempt()),
                    "Exception reporting suppressed for this attempt"
                );
                return;
            }

            fire(def, EventKind::Exception, &scope);
            report(def, error, state.provided(), settings, retry_record, depth);
        }
    }
}

/// Run every matching callback of `kind` in declaration order
fn fire(def: &Definition, kind: EventKind, scope: &CallbackScope<'_>) {
    for callback in def.callbacks.iter().filter(|c| c.kind == kind) {
        if !callback.applies(scope) {
            continue;
        }
        if let Some(Err(e)) = contain_panic(&def.name, "callback", || (callback.handler)(scope)) {
            warn!(action = %def.name, kind = ?kind, error = %e, "Ignoring error raised in callback");
        }
    }
}

fn report(
    def: &Definition,
    error: &ActionError,
    inputs: &HashMap<String, Value>,
    settings: &Settings,
    retry_record: Option<&RetryRecord>,
    depth: usize,
) {
    let Some(reporter) = settings.reporter.as_ref() else {
        return;
    };
    let context = ReportContext {
        action: &def.name,
        inputs: filter_sensitive(&def.inputs, inputs),
        retry: retry_record,
        depth,
    };
    if let Some(Err(e)) =
        contain_panic(&def.name, "exception reporter", || reporter.report(error, &context))
    {
        warn!(action = %def.name, error = %e, "Exception reporter failed");
    }
}
