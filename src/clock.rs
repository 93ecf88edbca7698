//! Clock Module
//!
//! Timestamp source for versioned values.
//!
//! Every write is stamped with a value from a [`Clock`]. The engine owns a
//! single clock and shares it with every MemTable, so timestamps are strictly
//! increasing across the whole process. That total order is the only
//! conflict-resolution rule between layers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Source of strictly increasing timestamps
///
/// Implementations must never return 0 and never return a value that is
/// less than or equal to a previously returned one.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Return the next timestamp
    fn tick(&self) -> u64;

    /// Guarantee every later `tick` is greater than `timestamp`
    ///
    /// Called on startup with the newest timestamp found on disk.
    fn observe(&self, timestamp: u64);
}

// =============================================================================
// MonotonicClock
// =============================================================================

/// Wall-clock based timestamps with nanosecond resolution
///
/// The value is `millis * 1_000_000 + n` where `n` counts calls within the
/// same millisecond. If the wall clock stalls or steps backwards the clock
/// keeps counting from the last value it handed out.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<u64>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn wall_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Clock for MonotonicClock {
    fn tick(&self) -> u64 {
        let candidate = Self::wall_millis() * 1_000_000 + 1;
        let mut last = self.last.lock();
        let next = if candidate > *last { candidate } else { *last + 1 };
        *last = next;
        next
    }

    fn observe(&self, timestamp: u64) {
        let mut last = self.last.lock();
        *last = (*last).max(timestamp);
    }
}

// =============================================================================
// SequenceClock
// =============================================================================

/// Deterministic counter, mainly for tests
#[derive(Debug)]
pub struct SequenceClock {
    next: AtomicU64,
}

impl SequenceClock {
    /// Start counting at `start` (values below 1 are raised to 1)
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    /// Peek at the value the next `tick` will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequenceClock {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl Clock for SequenceClock {
    fn tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    fn observe(&self, timestamp: u64) {
        self.next
            .fetch_max(timestamp.saturating_add(1), Ordering::SeqCst);
    }
}
