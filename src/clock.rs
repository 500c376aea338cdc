//! Timestamp sources for the tracker
//!
//! Every timestamp in lapse is a `u64` count of nanoseconds. Production code
//! uses [`MonotonicClock`], whose readings strictly increase. Tests and the replay
//! driver use [`ManualClock`], whose value only moves when told to, so that
//! durations and interval bounds are exact.
//!
//! # Example
//!
//! ```
//! use lapse::clock::{Clock, ManualClock};
//!
//! let clock = ManualClock::new(100);
//! assert_eq!(clock.now_ns(), 100);
//!
//! clock.advance(50);
//! assert_eq!(clock.now_ns(), 150);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of nanosecond timestamps
///
/// Implementations must be callable from any thread without external locking.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds
    fn now_ns(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// Monotonic clock measuring nanoseconds since its creation
///
/// Backed by [`Instant`], so it is immune to wall-clock adjustments. Two
/// readings never compare equal: a reading that would repeat or trail the
/// previous one is bumped to one past it, Lamport-style.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let next = |last: u64| elapsed.max(last.saturating_add(1));

        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(next(last)))
        {
            Ok(last) | Err(last) => next(last),
        }
    }
}

/// Manually driven clock
///
/// Lock-free: `set` and `advance` are single atomic operations, so a clock
/// can be shared through `Arc` between a test thread and the tracker.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ns`
    pub const fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::SeqCst);
    }

    /// Move forward by `delta_ns`, returning the new time
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::SeqCst) + delta_ns
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
