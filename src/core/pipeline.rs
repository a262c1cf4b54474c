//! Execution pipeline.
//!
//! Outer phases, outermost first:
//! 1. Nesting: tracks call depth for the duration of the call
//! 2. Tracing: `action` span plus lifecycle notifications
//! 3. Logging: input and completion logs at configured levels
//! 4. Timing: stores elapsed time on every exit path
//!
//! The innermost step is the exception boundary. Outer phases run around a
//! result that the boundary has already settled; anything they do that can
//! fail is caught and logged here so it cannot change the outcome.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde_json::Value;
use tracing::{field, info_span, warn};
use uuid::Uuid;

use crate::config::{LogLevel, Settings};
use crate::domain::callbacks::contain_panic;
use crate::domain::field::filter_sensitive;
use crate::domain::{ExecutionState, LifecycleEvent, Outcome, RetryRecord};

use super::action::ActionDef;
use super::nesting::NestingGuard;
use super::result::ResultView;
use super::{boundary, retry};

/// Emit a tracing event at a level chosen at runtime
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Off => {}
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
            LogLevel::Warn => tracing::warn!($($arg)+),
            LogLevel::Error => tracing::error!($($arg)+),
        }
    };
}

/// Receives start/finish notifications for every invocation
pub trait LifecycleSubscriber: Send + Sync {
    fn notify(&self, event: &LifecycleEvent) -> anyhow::Result<()>;
}

/// Subscriber that keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySubscriber {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl MemorySubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl LifecycleSubscriber for MemorySubscriber {
    fn notify(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("Event buffer lock poisoned"))?;
        events.push(event.clone());
        Ok(())
    }
}

/// Everything one invocation carries through the outer phases
pub(crate) struct Invocation<'a> {
    id: Uuid,
    def: &'a ActionDef,
    settings: &'a Settings,
    retry: Option<RetryRecord>,
    depth: usize,
    state: ExecutionState,
}

type Inner<'i> = dyn FnMut(&mut Invocation<'_>) + 'i;

/// One wrapper in the outside zone
trait Phase: Sync {
    fn wrap(&self, inv: &mut Invocation<'_>, inner: &mut Inner<'_>);
}

struct Nesting;
struct Tracing;
struct Logging;
struct Timing;

static OUTER_PHASES: [&dyn Phase; 4] = [&Nesting, &Tracing, &Logging, &Timing];

/// Run `def` through every phase. Never panics and never returns an error.
pub(crate) fn execute(
    def: &ActionDef,
    settings: &Settings,
    inputs: HashMap<String, Value>,
) -> ResultView {
    let mut inv = Invocation {
        id: Uuid::new_v4(),
        def,
        settings,
        retry: retry::current(),
        depth: 0,
        state: ExecutionState::new(inputs),
    };

    run_phases(&OUTER_PHASES, &mut inv, &mut |inv: &mut Invocation<'_>| {
        boundary::run(
            inv.def.definition(),
            &mut inv.state,
            inv.settings,
            inv.retry.as_ref(),
            inv.depth,
        );
    });

    ResultView::new(def, inv.state)
}

fn run_phases(phases: &[&dyn Phase], inv: &mut Invocation<'_>, core: &mut Inner<'_>) {
    match phases.split_first() {
        Some((phase, rest)) => phase.wrap(inv, &mut |inv: &mut Invocation<'_>| run_phases(rest, inv, core)),
        None => core(inv),
    }
}

impl Phase for Nesting {
    fn wrap(&self, inv: &mut Invocation<'_>, inner: &mut Inner<'_>) {
        let guard = NestingGuard::enter();
        inv.depth = guard.depth();
        inner(inv);
    }
}

impl Phase for Tracing {
    fn wrap(&self, inv: &mut Invocation<'_>, inner: &mut Inner<'_>) {
        let span = info_span!(
            "action",
            action = %inv.def.name(),
            depth = inv.depth,
            outcome = field::Empty,
            elapsed_ms = field::Empty,
        );

        let started = LifecycleEvent::started(inv.id, inv.def.name(), inv.depth)
            .with_inputs(filter_sensitive(inv.def.inputs(), inv.state.provided()));
        notify(inv, &started);

        span.in_scope(|| inner(inv));

        let outcome = inv.state.outcome();
        span.record("outcome", outcome.as_str());
        span.record("elapsed_ms", inv.state.elapsed_ms());

        let mut finished = LifecycleEvent::finished(
            inv.id,
            inv.def.name(),
            inv.depth,
            outcome,
            inv.state.elapsed_ms(),
        );
        if outcome != Outcome::Success {
            let error = inv
                .state
                .exception()
                .map(|e| e.to_string())
                .or_else(|| inv.state.failure().map(|f| f.to_string()));
            if let Some(error) = error {
                finished = finished.with_error(error);
            }
        }
        notify(inv, &finished);
    }
}

fn notify(inv: &Invocation<'_>, event: &LifecycleEvent) {
    for subscriber in &inv.settings.subscribers {
        if let Some(Err(e)) = contain_panic(inv.def.name(), "lifecycle subscriber", || {
            subscriber.notify(event)
        }) {
            warn!(action = %inv.def.name(), error = %e, "Lifecycle subscriber failed");
        }
    }
}

impl Phase for Logging {
    fn wrap(&self, inv: &mut Invocation<'_>, inner: &mut Inner<'_>) {
        let settings = inv.settings;
        let log = &settings.log;
        let indent = "  ".repeat(inv.depth);

        if log.call != LogLevel::Off {
            let shown = filter_sensitive(inv.def.inputs(), inv.state.provided());
            let rendered = serde_json::to_string(&shown).unwrap_or_else(|_| "{}".to_string());
            log_at!(
                log.call,
                action = %inv.def.name(),
                depth = inv.depth,
                "{}About to execute with: {}",
                indent,
                rendered
            );
        }

        inner(inv);

        let outcome = inv.state.outcome();
        let level = match outcome {
            Outcome::Success => log.success,
            Outcome::Failure => log.failure,
            Outcome::ExceptionRaised => log.exception,
        };
        let detail = inv
            .state
            .exception()
            .map(|e| format!(": {}", e))
            .or_else(|| inv.state.failure().map(|f| format!(": {}", f)))
            .unwrap_or_default();
        log_at!(
            level,
            action = %inv.def.name(),
            depth = inv.depth,
            outcome = outcome.as_str(),
            elapsed_ms = inv.state.elapsed_ms(),
            "{}Execution completed ({}) in {:.3}ms{}",
            indent,
            outcome,
            inv.state.elapsed_ms(),
            detail
        );
    }
}

impl Phase for Timing {
    fn wrap(&self, inv: &mut Invocation<'_>, inner: &mut Inner<'_>) {
        let started = Instant::now();
        inner(inv);
        inv.state.set_elapsed_ms(started.elapsed().as_secs_f64() * 1000.0);
    }
}
