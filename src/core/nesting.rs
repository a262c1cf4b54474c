//! Call-depth tracking for nested action invocations.
//!
//! Depth is kept per thread and only changes through `NestingGuard`, which
//! restores the previous depth when dropped, including during unwinding.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Number of action invocations currently running on this thread
pub fn depth() -> usize {
    DEPTH.with(Cell::get)
}

/// Marks one level of nesting for as long as it is alive
#[derive(Debug)]
pub struct NestingGuard {
    outer: usize,
    // Depth is thread-local; the guard must be dropped on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl NestingGuard {
    pub fn enter() -> Self {
        let outer = DEPTH.with(|d| {
            let outer = d.get();
            d.set(outer + 1);
            outer
        });
        Self {
            outer,
            _not_send: PhantomData,
        }
    }

    /// Depth of the invocation holding this guard (0 for a top-level call)
    pub fn depth(&self) -> usize {
        self.outer
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(self.outer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_depth() {
        let before = depth();
        {
            let outer = NestingGuard::enter();
            assert_eq!(outer.depth(), before);
            {
                let inner = NestingGuard::enter();
                assert_eq!(inner.depth(), before + 1);
                assert_eq!(depth(), before + 2);
            }
            assert_eq!(depth(), before + 1);
        }
        assert_eq!(depth(), before);
    }

    #[test]
    fn test_guard_restores_depth_on_panic() {
        let before = depth();
        let result = std::panic::catch_unwind(|| {
            let _guard = NestingGuard::enter();
            panic!("unwinding");
        });
        assert!(result.is_err());
        assert_eq!(depth(), before);
    }
}
