//! Block-time sources
//!
//! The engine never reads wall-clock time directly; it asks a [`Clock`] for
//! the current block timestamp in microseconds. Production uses
//! [`SystemClock`], simulations and tests drive a [`ManualClock`].

use crate::types::{Timestamp, MICROSECONDS_IN_A_DAY};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the current block timestamp (microseconds)
pub trait Clock: Send + Sync {
    fn now_us(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> Timestamp {
        chrono::Utc::now().timestamp_micros().max(0) as Timestamp
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Move forward by `delta` microseconds, returning the new time
    pub fn advance(&self, delta: Timestamp) -> Timestamp {
        self.now.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn advance_days(&self, days: u64) -> Timestamp {
        self.advance(days * MICROSECONDS_IN_A_DAY)
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
