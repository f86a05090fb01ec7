//! Reference lifetime management at the interpreter boundary
//!
//! Design:
//! 1. Owned handles release exactly once (drop, `release`, or `into_raw`)
//! 2. Borrowed handles carry no release obligation
//! 3. `release(None)` is a no-op for partially built cleanup paths
//! 4. A per-thread ledger counts live owned handles for leak checks

pub mod handle;
pub mod ledger;

pub use handle::{acquire, release, BorrowedHandle, OwnedHandle};
pub use ledger::{balanced, live_handles, LeakCheck};
