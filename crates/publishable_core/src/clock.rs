//! Current-time providers.
//!
//! # Responsibility
//! - Supply "now" for the default publication filter and `is_published`.
//!
//! # Invariants
//! - Time is Unix epoch milliseconds, the same representation the
//!   `published_at` columns store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix epoch milliseconds.
pub type EpochMs = i64;

/// One day in epoch milliseconds.
pub const DAY_MS: EpochMs = 24 * 60 * 60 * 1000;

/// Source of the current timestamp.
pub trait Clock: Send + Sync {
    fn now_epoch_ms(&self) -> EpochMs;
}

/// Wall clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> EpochMs {
        // A clock set before 1970 collapses to the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Manually driven clock for deterministic callers and tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: EpochMs) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: EpochMs) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward (or backward for negative `delta`).
    pub fn advance(&self, delta: EpochMs) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_ms(&self) -> EpochMs {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, FixedClock, SystemClock, DAY_MS};

    #[test]
    fn fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_epoch_ms(), 1_000);

        clock.advance(DAY_MS);
        assert_eq!(clock.now_epoch_ms(), 1_000 + DAY_MS);

        clock.set(5);
        assert_eq!(clock.now_epoch_ms(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_epoch_ms() > 1_577_836_800_000);
    }
}
