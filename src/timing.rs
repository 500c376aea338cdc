//! Start/stop correlation for in-flight activities
//!
//! A [`TimingCorrelator`] pairs an "activity started" event with its matching
//! "activity finished" event by `(name, subject_id)` and reports the elapsed
//! time between them. The host guarantees that a subject id is unique within
//! its name while the activity is in flight (method and assembly handles are
//! stable while loaded); the correlator relies on that and allocates no ids
//! of its own.
//!
//! # Semantics
//!
//! - `start` on a key that is already pending is a silent no-op: the first
//!   start wins and reentrant starts are coalesced, not stacked.
//! - `stop` removes the pending entry, so the ledger only ever holds
//!   activities that are actually in flight.
//! - `stop` without a pending start fails with [`TrackerError::MissingStart`]
//!   and leaves the ledger untouched.
//!
//! # Concurrency
//!
//! The ledger is a sharded [`DashMap`]: callers touching keys in different
//! shards never contend, and a start or stop holds one shard lock for a
//! single hash-map operation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fnv::FnvBuildHasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TrackerError;

/// Category of a timed activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// Method execution (enter/leave hooks)
    Method,
    /// Assembly load
    Assembly,
    /// JIT compilation of a method
    Jit,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] = [
        ActivityKind::Method,
        ActivityKind::Assembly,
        ActivityKind::Jit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Method => "method",
            ActivityKind::Assembly => "assembly",
            ActivityKind::Jit => "jit",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ActivityKind::Method => 0,
            ActivityKind::Assembly => 1,
            ActivityKind::Jit => 2,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched start/stop pair, in clock nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub start: u64,
    pub end: u64,
}

impl Elapsed {
    /// Pair a start with its stop
    ///
    /// A stop read before its start (clock went backwards) yields an empty
    /// interval at `end`, never an inverted one.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start: start.min(end),
            end,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns())
    }

    pub fn duration_ns(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

type LedgerKey = (Arc<str>, u64);

/// Pending-start ledger for one activity category
#[derive(Debug)]
pub struct TimingCorrelator {
    kind: ActivityKind,
    pending: DashMap<LedgerKey, u64, FnvBuildHasher>,
}

impl TimingCorrelator {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            pending: DashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    pub fn kind(&self) -> ActivityKind {
        self.kind
    }

    /// Record a pending start at `now`
    ///
    /// Returns `false` when a start for the same key was already pending;
    /// the original start time is kept.
    pub fn start(&self, subject_id: u64, name: Arc<str>, now: u64) -> bool {
        match self.pending.entry((name, subject_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Close the pending start for `(name, subject_id)` at `now`
    pub fn stop(
        &self,
        subject_id: u64,
        name: &Arc<str>,
        now: u64,
    ) -> Result<Elapsed, TrackerError> {
        self.take(subject_id, name).map(|start| Elapsed::new(start, now))
    }

    /// Remove the pending start for `(name, subject_id)` and return its time
    ///
    /// Of several callers racing on one key, exactly one gets `Ok`.
    pub fn take(&self, subject_id: u64, name: &Arc<str>) -> Result<u64, TrackerError> {
        match self.pending.remove(&(name.clone(), subject_id)) {
            Some((_, start)) => Ok(start),
            None => Err(self.missing_start(subject_id, name)),
        }
    }

    pub(crate) fn missing_start(&self, subject_id: u64, name: &str) -> TrackerError {
        TrackerError::MissingStart {
            kind: self.kind,
            subject_id,
            name: name.to_string(),
        }
    }

    pub fn is_pending(&self, subject_id: u64, name: &Arc<str>) -> bool {
        self.pending.contains_key(&(name.clone(), subject_id))
    }

    /// Start time of a pending activity, if any
    pub fn pending_start(&self, subject_id: u64, name: &Arc<str>) -> Option<u64> {
        self.pending
            .get(&(name.clone(), subject_id))
            .map(|entry| *entry.value())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop pending starts older than `ttl_ns` at time `now`
    ///
    /// A start with no matching stop is a leak; this bounds it. Returns the
    /// number of entries removed.
    pub fn reap_stale(&self, now: u64, ttl_ns: u64) -> usize {
        let mut reaped = 0;
        self.pending.retain(|_, start| {
            let keep = now.saturating_sub(*start) < ttl_ns;
            if !keep {
                reaped += 1;
            }
            keep
        });
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn name(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn test_start_then_stop_measures_elapsed() {
        let timing = TimingCorrelator::new(ActivityKind::Method);
        let main = name("Main");

        assert!(timing.start(1, main.clone(), 100));
        let elapsed = timing.stop(1, &main, 350).unwrap();

        assert_eq!(elapsed, Elapsed { start: 100, end: 350 });
        assert_eq!(elapsed.duration(), Duration::from_nanos(250));
        assert_eq!(timing.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_start_keeps_first() {
        let timing = TimingCorrelator::new(ActivityKind::Method);
        let main = name("Main");

        assert!(timing.start(1, main.clone(), 100));
        assert!(!timing.start(1, main.clone(), 200));
        assert_eq!(timing.pending_count(), 1);
        assert_eq!(timing.pending_start(1, &main), Some(100));

        let elapsed = timing.stop(1, &main, 500).unwrap();
        assert_eq!(elapsed.duration_ns(), 400);
    }

    #[test]
    fn test_stop_without_start_is_missing_start() {
        let timing = TimingCorrelator::new(ActivityKind::Assembly);
        let other = name("Other");
        timing.start(7, other, 10);

        let err = timing.stop(1, &name("System.Core"), 20).unwrap_err();
        assert_eq!(
            err,
            TrackerError::MissingStart {
                kind: ActivityKind::Assembly,
                subject_id: 1,
                name: "System.Core".to_string(),
            }
        );
        // Unrelated pending entry untouched
        assert_eq!(timing.pending_count(), 1);
    }

    #[test]
    fn test_second_stop_fails() {
        let timing = TimingCorrelator::new(ActivityKind::Method);
        let main = name("Main");
        timing.start(1, main.clone(), 0);
        timing.stop(1, &main, 1).unwrap();
        assert!(timing.stop(1, &main, 2).is_err());
    }

    #[test]
    fn test_same_id_different_names_are_independent() {
        let timing = TimingCorrelator::new(ActivityKind::Method);
        let a = name("A");
        let b = name("B");
        timing.start(1, a.clone(), 10);
        timing.start(1, b.clone(), 20);

        assert_eq!(timing.stop(1, &b, 30).unwrap().duration_ns(), 10);
        assert_eq!(timing.stop(1, &a, 30).unwrap().duration_ns(), 20);
    }

    #[test]
    fn test_clock_going_backwards_yields_empty_interval() {
        let elapsed = Elapsed::new(500, 100);
        assert_eq!(elapsed, Elapsed { start: 100, end: 100 });
        assert_eq!(elapsed.duration(), Duration::ZERO);

        let timing = TimingCorrelator::new(ActivityKind::Method);
        let main = name("Main");
        timing.start(1, main.clone(), 500);
        assert_eq!(timing.stop(1, &main, 100).unwrap(), Elapsed { start: 100, end: 100 });
    }

    #[test]
    fn test_reap_stale_removes_only_old_entries() {
        let timing = TimingCorrelator::new(ActivityKind::Jit);
        timing.start(1, name("Old"), 0);
        timing.start(2, name("Young"), 900);

        let reaped = timing.reap_stale(1_000, 500);
        assert_eq!(reaped, 1);
        assert!(!timing.is_pending(1, &name("Old")));
        assert!(timing.is_pending(2, &name("Young")));
    }

    #[test]
    fn test_concurrent_start_stop_leaves_empty_ledger() {
        let timing = Arc::new(TimingCorrelator::new(ActivityKind::Method));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let timing = timing.clone();
                thread::spawn(move || {
                    let n = name("Worker.Run");
                    for i in 0..500u64 {
                        let id = t * 10_000 + i;
                        timing.start(id, n.clone(), i);
                        timing.stop(id, &n, i + 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(timing.pending_count(), 0);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ActivityKind::Method.to_string(), "method");
        assert_eq!(ActivityKind::Assembly.to_string(), "assembly");
        assert_eq!(ActivityKind::Jit.to_string(), "jit");
        for (i, kind) in ActivityKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
