//! Rolling window of activity snapshots
//!
//! A snapshot records which `(thread, activity)` pairs were seen between its
//! start and end time. The window keeps one *accumulating* snapshot that
//! every [`SnapshotWindow::record_activity`] call writes into, plus a bounded
//! FIFO of *finalized* snapshots.
//!
//! ```text
//!   record_activity(7, "Main") ─┐
//!   record_activity(9, "Load") ─┤
//!                               ▼
//!   history: [S1][S2][S3]  ◄── current S4 (accumulating)
//!                                  │ snapshot(now)
//!                                  ▼
//!   history: [S2][S3][S4]  ◄── current S5        (capacity = 3, S1 evicted)
//! ```
//!
//! Both the current snapshot and the history sit behind one mutex, so a
//! harvest either includes a concurrent `record_activity` or leaves it for the
//! next snapshot, never half of it. `involved` is a set, so a pair reported
//! many times in one window appears once.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

/// A thread observed running an activity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActiveThread {
    pub thread_id: u64,
    pub name: Arc<str>,
}

/// Set of active `(thread, activity)` pairs over a time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub start_time: u64,
    /// `None` while the snapshot is still accumulating
    pub end_time: Option<u64>,
    pub involved: BTreeSet<ActiveThread>,
}

impl Snapshot {
    fn begin(start_time: u64) -> Self {
        Self {
            start_time,
            end_time: None,
            involved: BTreeSet::new(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Query bounds for the interval store; an open snapshot extends to `u64::MAX`
    pub fn bounds(&self) -> (u64, u64) {
        (self.start_time, self.end_time.unwrap_or(u64::MAX))
    }

    pub fn contains(&self, thread_id: u64, name: &str) -> bool {
        self.involved
            .iter()
            .any(|active| active.thread_id == thread_id && &*active.name == name)
    }
}

#[derive(Debug)]
struct WindowState {
    current: Snapshot,
    history: VecDeque<Snapshot>,
}

/// Fixed-capacity FIFO of finalized snapshots plus one accumulating snapshot
#[derive(Debug)]
pub struct SnapshotWindow {
    capacity: usize,
    state: Mutex<WindowState>,
}

impl SnapshotWindow {
    /// Create a window retaining `capacity` finalized snapshots, arming the
    /// first snapshot at `now`
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize, now: u64) -> Self {
        assert!(capacity > 0, "Snapshot window capacity must be > 0");

        Self {
            capacity,
            state: Mutex::new(WindowState {
                current: Snapshot::begin(now),
                history: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Mark `(thread_id, name)` as alive in the current snapshot
    ///
    /// Returns `false` if the pair was already recorded in this window.
    pub fn record_activity(&self, thread_id: u64, name: Arc<str>) -> bool {
        self.state
            .lock()
            .current
            .involved
            .insert(ActiveThread { thread_id, name })
    }

    /// Run `complete` under the window lock, then mark `(thread_id, name)` in
    /// the current snapshot
    ///
    /// A harvest cannot interleave: if `complete` reads the clock, the
    /// reading falls inside the bounds of the snapshot the pair lands in.
    pub fn record_with<T>(
        &self,
        thread_id: u64,
        name: Arc<str>,
        complete: impl FnOnce() -> T,
    ) -> T {
        let mut state = self.state.lock();
        let value = complete();
        state.current.involved.insert(ActiveThread { thread_id, name });
        value
    }

    /// Finalize the current snapshot at `now`, retain it, and arm a new one
    ///
    /// The oldest finalized snapshot is evicted first when the history is full.
    pub fn snapshot(&self, now: u64) -> Snapshot {
        self.snapshot_with(|| now)
    }

    /// Like [`snapshot`](Self::snapshot), reading the end time under the window lock
    pub fn snapshot_with(&self, now: impl FnOnce() -> u64) -> Snapshot {
        let mut state = self.state.lock();
        let now = now();

        let mut finished = std::mem::replace(&mut state.current, Snapshot::begin(now));
        finished.end_time = Some(now);

        if state.history.len() == self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(finished.clone());

        tracing::debug!(
            start = finished.start_time,
            end = now,
            involved = finished.involved.len(),
            retained = state.history.len(),
            "snapshot rotated"
        );

        finished
    }

    /// Finalized snapshots, oldest first
    pub fn history(&self) -> Vec<Snapshot> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Most recently finalized snapshot
    pub fn latest(&self) -> Option<Snapshot> {
        self.state.lock().history.back().cloned()
    }

    /// Copy of the accumulating snapshot
    pub fn current(&self) -> Snapshot {
        self.state.lock().current.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained finalized snapshots
    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
