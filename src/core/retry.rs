//! Retry-attempt-aware exception reporting.
//!
//! `should_report` is the pure decision function. `RetryScope` makes the
//! current job's `RetryRecord` visible to actions run on this thread for
//! the lifetime of the scope.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::domain::{ReportMode, RetryRecord};

thread_local! {
    static CURRENT: RefCell<Option<RetryRecord>> = const { RefCell::new(None) };
}

/// Decide whether an exception raised on `attempt` should be reported.
///
/// `mode` is the action's own override; `None` falls back to `default_mode`,
/// the process-wide setting.
pub fn should_report(
    mode: Option<ReportMode>,
    attempt: u32,
    max_retries: u32,
    default_mode: ReportMode,
) -> bool {
    mode.unwrap_or(default_mode).should_report(attempt, max_retries)
}

/// Gate for an invocation: always report outside a retrying job.
pub(crate) fn gate(
    mode: Option<ReportMode>,
    record: Option<&RetryRecord>,
    default_mode: ReportMode,
) -> bool {
    match record {
        Some(record) => should_report(mode, record.attempt(), record.max_retries(), default_mode),
        None => true,
    }
}

/// The retry record of the job currently executing on this thread, if any
pub fn current() -> Option<RetryRecord> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Installs a retry record until dropped, then restores the previous one
#[derive(Debug)]
pub struct RetryScope {
    prior: Option<RetryRecord>,
    _not_send: PhantomData<*const ()>,
}

impl RetryScope {
    pub fn enter(record: RetryRecord) -> Self {
        let prior = CURRENT.with(|c| c.borrow_mut().replace(record));
        Self {
            prior,
            _not_send: PhantomData,
        }
    }
}

impl Drop for RetryScope {
    fn drop(&mut self) {
        let prior = self.prior.take();
        CURRENT.with(|c| *c.borrow_mut() = prior);
    }
}

/// Run `f` with `record` as the current retry record
pub fn with_record<T>(record: RetryRecord, f: impl FnOnce() -> T) -> T {
    let _scope = RetryScope::enter(record);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_beats_default() {
        assert!(!should_report(Some(ReportMode::OnlyExhausted), 1, 3, ReportMode::EveryAttempt));
        assert!(should_report(None, 2, 3, ReportMode::EveryAttempt));
        assert!(!should_report(None, 2, 3, ReportMode::FirstAndExhausted));
    }

    #[test]
    fn test_gate_without_record_reports() {
        assert!(gate(Some(ReportMode::OnlyExhausted), None, ReportMode::OnlyExhausted));
    }

    #[test]
    fn test_scope_restores_prior_record() {
        assert_eq!(current(), None);

        let outer = RetryRecord::first("inline", 3);
        let inner = outer.next_attempt();

        with_record(outer.clone(), || {
            assert_eq!(current(), Some(outer.clone()));
            with_record(inner.clone(), || {
                assert_eq!(current().map(|r| r.attempt()), Some(2));
            });
            assert_eq!(current(), Some(outer.clone()));
        });

        assert_eq!(current(), None);
    }

    #[test]
    fn test_scope_restores_none_on_panic() {
        let result = std::panic::catch_unwind(|| {
            with_record(RetryRecord::first("inline", 1), || panic!("job blew up"));
        });
        assert!(result.is_err());
        assert_eq!(current(), None);
    }
}
