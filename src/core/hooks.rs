//! Lifecycle hook composition around the work function.
//!
//! Around hooks nest: the first declared wraps every later one, and the
//! innermost wraps the core sequence of before hooks, work, then after hooks
//! in reverse declaration order. A `Flow::Done` from any level skips the
//! rest of the core sequence and surfaces from `run_chain` even when an
//! enclosing around hook returns `Flow::Continue`.
//!
//! Early completion does not unwind enclosing around hooks: code after
//! `next.run(ctx)` still executes. A hook that should skip its post-work
//! after an early completion checks `flow.is_done()` on the returned flow.

use std::cell::Cell;
use std::sync::Arc;

use crate::domain::Halt;

use super::context::Context;

/// Work function, before hook or after hook
pub type Hook = Arc<dyn Fn(&mut Context<'_>) -> Result<Flow, Halt> + Send + Sync>;

/// Around hook; must call `next.run(ctx)` to proceed.
///
/// Statements after `next.run` run even when the returned flow is done.
pub type AroundHook = Arc<dyn Fn(&mut Context<'_>, Next<'_>) -> Result<Flow, Halt> + Send + Sync>;

/// Control signal returned by work and hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop now and treat the invocation as a success
    Done(Option<String>),
}

impl Flow {
    pub fn done(message: impl Into<String>) -> Self {
        Self::Done(Some(message.into()))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Continuation handed to an around hook: everything nested inside it
#[derive(Clone, Copy)]
pub struct Next<'a> {
    around: &'a [AroundHook],
    before: &'a [Hook],
    work: &'a Hook,
    after: &'a [Hook],
    early: &'a Cell<Option<Option<String>>>,
}

impl Next<'_> {
    /// Run the remaining around hooks and the core sequence
    pub fn run(self, ctx: &mut Context<'_>) -> Result<Flow, Halt> {
        let flow = match self.around.split_first() {
            Some((hook, rest)) => hook(ctx, Next { around: rest, ..self })?,
            None => self.run_core(ctx)?,
        };
        if let Flow::Done(message) = &flow {
            self.record_early(message.clone());
        }
        Ok(flow)
    }

    fn run_core(&self, ctx: &mut Context<'_>) -> Result<Flow, Halt> {
        for hook in self.before {
            if let done @ Flow::Done(_) = hook(ctx)? {
                return Ok(done);
            }
        }

        if let done @ Flow::Done(_) = (self.work)(ctx)? {
            return Ok(done);
        }

        for hook in self.after.iter().rev() {
            if let done @ Flow::Done(_) = hook(ctx)? {
                return Ok(done);
            }
        }

        Ok(Flow::Continue)
    }

    // The innermost completion keeps its message.
    fn record_early(&self, message: Option<String>) {
        let prior = self.early.take();
        self.early.set(prior.or(Some(message)));
    }
}

/// Run before/around/after hooks and the work function in order
pub fn run_chain(
    before: &[Hook],
    around: &[AroundHook],
    after: &[Hook],
    work: &Hook,
    ctx: &mut Context<'_>,
) -> Result<Flow, Halt> {
    let early = Cell::new(None);
    let next = Next {
        around,
        before,
        work,
        after,
        early: &early,
    };

    let flow = next.run(ctx)?;
    match early.take() {
        Some(message) => Ok(Flow::Done(message)),
        None => Ok(flow),
    }
}
