//! Historical interval index
//!
//! The store maps `thread_id -> activity name -> start -> end` and answers
//! "which intervals of this thread/activity overlap `[t0, t1]`". It is the
//! durable ground truth behind the rolling snapshot window: snapshots say
//! *who* was active in a window, the store says *when*.
//!
//! # Design
//!
//! ```text
//! threads: { 7 => { "Main"   => { 100 => Some(200), 450 => None },
//!                   "Helper" => { 120 => Some(130) } },
//!            9 => { ... } }
//! ```
//!
//! - Inserts are upserts keyed by start: re-inserting the same
//!   `(thread, name, start)` overwrites the end (last write wins). This is how
//!   an open interval recorded at enter time gets closed at leave time.
//! - An interval with `end == None` is still open and matches every query.
//! - Writes take one `parking_lot::RwLock` for an O(log n) map insert; queries
//!   share the read side. The lock does not poison, so a panicking caller
//!   cannot wedge the store for everyone else.

use fnv::FnvBuildHasher;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use crate::config::RetentionPolicy;

/// A time range during which an activity was alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: u64,
    /// `None` while the activity is still running
    pub end: Option<u64>,
}

impl Interval {
    pub fn closed(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn open(start: u64) -> Self {
        Self { start, end: None }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Overlap with `[t0, t1]`: `start <= t1 && end > t0`, open intervals always match
    ///
    /// ```
    /// use lapse::interval_store::Interval;
    ///
    /// let iv = Interval::closed(100, 200);
    /// assert!(iv.overlaps(150, 160));
    /// assert!(iv.overlaps(90, 100));
    /// assert!(iv.overlaps(199, 300));
    /// assert!(!iv.overlaps(201, 300));
    /// assert!(Interval::open(1_000).overlaps(0, 10));
    /// ```
    pub fn overlaps(&self, t0: u64, t1: u64) -> bool {
        match self.end {
            None => true,
            Some(end) => self.start <= t1 && end > t0,
        }
    }

    pub fn duration_ns(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start))
    }
}

type Timeline = BTreeMap<u64, Option<u64>>;
type NameTimelines = HashMap<Arc<str>, Timeline, FnvBuildHasher>;

/// Per-thread, per-name interval index
#[derive(Debug, Default)]
pub struct IntervalStore {
    retention: RetentionPolicy,
    threads: RwLock<HashMap<u64, NameTimelines, FnvBuildHasher>>,
}

impl IntervalStore {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            retention,
            threads: RwLock::new(HashMap::default()),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Upsert an interval keyed by `(thread_id, name, start)`
    pub fn insert(&self, thread_id: u64, name: Arc<str>, start: u64, end: Option<u64>) {
        let mut threads = self.threads.write();
        let timeline = threads
            .entry(thread_id)
            .or_default()
            .entry(name)
            .or_default();
        timeline.insert(start, end);

        if let RetentionPolicy::MaxPerKey(limit) = self.retention {
            while timeline.len() > limit {
                timeline.pop_first();
            }
        }
    }

    /// Record an interval that has started but not finished
    pub fn open(&self, thread_id: u64, name: Arc<str>, start: u64) {
        self.insert(thread_id, name, start, None);
    }

    /// Every stored interval of `(thread_id, name)` overlapping `[t0, t1]`, ordered by start
    ///
    /// Unknown threads or names yield an empty result.
    pub fn query(&self, thread_id: u64, name: &str, t0: u64, t1: u64) -> Vec<Interval> {
        let threads = self.threads.read();
        let Some(timeline) = threads.get(&thread_id).and_then(|names| names.get(name)) else {
            return Vec::new();
        };

        // Closed intervals starting after t1 can never overlap; open ones always do.
        let mut matches: Vec<Interval> = timeline
            .range(..=t1)
            .map(|(&start, &end)| Interval { start, end })
            .filter(|interval| interval.overlaps(t0, t1))
            .collect();
        matches.extend(
            timeline
                .range((Bound::Excluded(t1), Bound::Unbounded))
                .filter(|(_, end)| end.is_none())
                .map(|(&start, _)| Interval::open(start)),
        );
        matches
    }

    /// Full history of one `(thread_id, name)` key
    pub fn intervals_for(&self, thread_id: u64, name: &str) -> Vec<Interval> {
        let threads = self.threads.read();
        threads
            .get(&thread_id)
            .and_then(|names| names.get(name))
            .map(|timeline| {
                timeline
                    .iter()
                    .map(|(&start, &end)| Interval { start, end })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Thread ids with at least one interval, ascending
    pub fn threads(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.threads.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of `(thread, name)` keys
    pub fn key_count(&self) -> usize {
        self.threads.read().values().map(HashMap::len).sum()
    }

    /// Total number of stored intervals
    pub fn len(&self) -> usize {
        self.threads
            .read()
            .values()
            .flat_map(|names| names.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
