//! Wall-clock port.
//!
//! Timestamps on the wire are epoch milliseconds, so the port speaks
//! milliseconds too. Tests drive time through `MockClock`.

use std::fmt::Debug;

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// System clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
pub use mock::MockClock;
