//! Handle ledger - per-thread count of live owned handles
//!
//! Owned handles are `!Send`, so every handle is created and released on
//! the same thread and a thread-local counter is exact. Leak checks compare
//! the counter before and after a sequence instead of relying on
//! interpreter-wide statistics, which other threads can disturb.

use crate::errors::{BridgeError, Result};
use std::cell::Cell;
use tracing::error;

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

#[inline]
pub(crate) fn record_acquire() {
    LIVE.with(|live| live.set(live.get() + 1));
}

#[inline]
pub(crate) fn record_release() {
    LIVE.with(|live| {
        let now = live.get() - 1;
        debug_assert!(now >= 0, "handle ledger underflow");
        live.set(now);
    });
}

/// Owned handles currently alive on this thread
pub fn live_handles() -> isize {
    LIVE.with(Cell::get)
}

/// Snapshot of the ledger taken at the start of a sequence
#[derive(Debug, Clone, Copy)]
pub struct LeakCheck {
    baseline: isize,
}

impl LeakCheck {
    pub fn begin() -> Self {
        Self { baseline: live_handles() }
    }

    /// Net handles created since `begin` that are still alive
    pub fn outstanding(&self) -> isize {
        live_handles() - self.baseline
    }

    /// Fail unless exactly `expected` handles outlive the sequence.
    ///
    /// `expected` is the number of owned handles the sequence hands back
    /// to its caller (0 when everything was decoded into native values).
    pub fn finish(self, expected: isize) -> Result<()> {
        let outstanding = self.outstanding() - expected;
        if outstanding == 0 {
            return Ok(());
        }

        error!(target: "ffi", outstanding, "handle ledger out of balance");
        Err(BridgeError::LeakInvariantViolation { outstanding })
    }
}

/// Run `f` and require every owned handle it created to be gone afterwards.
///
/// The check runs on the error path too, so a leak is reported even when
/// the sequence itself failed. A leak takes precedence over `f`'s outcome.
pub fn balanced<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let check = LeakCheck::begin();
    let outcome = f();
    check.finish(0)?;
    outcome
}
