//! Tracker façade
//!
//! [`ActivityTracker`] is the one handle the host-integration layer holds.
//! It owns a [`TimingCorrelator`] per [`ActivityKind`], the [`IntervalStore`]
//! and the [`SnapshotWindow`], and wires them together:
//!
//! ```text
//! enter  → track_start(kind, id, name)      → correlator[kind].start
//! leave  → track_stop(kind, id, name)       → correlator[kind].stop
//!                                           → intervals.insert(id, name, start, end)
//!                                           → window.record_activity(id, name)
//!                                           → sink.publish(measurement)
//! timer  → harvest()                        → window.snapshot(now)
//! export → intervals_in_range(id, name, t0, t1)
//! ```
//!
//! Build it once and share it by reference or `Arc`; every method takes
//! `&self` and is safe to call from any number of threads.
//!
//! # Example
//!
//! ```
//! use lapse::clock::ManualClock;
//! use lapse::config::TrackerConfig;
//! use lapse::timing::ActivityKind;
//! use lapse::tracker::ActivityTracker;
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(100));
//! let tracker = ActivityTracker::with_clock(&TrackerConfig::default(), clock.clone()).unwrap();
//!
//! tracker.track_start(ActivityKind::Method, 1, "Main");
//! clock.set(250);
//! let elapsed = tracker.track_stop(ActivityKind::Method, 1, "Main").unwrap();
//! assert_eq!(elapsed.as_nanos(), 150);
//!
//! let intervals = tracker.intervals_in_range(1, "Main", 0, 1_000);
//! assert_eq!(intervals.len(), 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::error::{ConfigError, TrackerError};
use crate::interval_store::{Interval, IntervalStore};
use crate::measurement::{Measurement, MeasurementSink};
use crate::names::NameRegistry;
use crate::snapshot::{Snapshot, SnapshotWindow};
use crate::timing::{ActivityKind, Elapsed, TimingCorrelator};

/// Intervals of one snapshot participant over the snapshot's bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotIntervals {
    pub thread_id: u64,
    pub name: Arc<str>,
    pub intervals: Vec<Interval>,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub pending_starts: usize,
    pub intervals: usize,
    pub snapshots_retained: usize,
    pub measurements_published: u64,
    pub missing_starts: u64,
    pub reaped_starts: u64,
    pub distinct_names: usize,
}

/// Timing correlation plus snapshot/interval bookkeeping
pub struct ActivityTracker<C: Clock = MonotonicClock> {
    clock: C,
    names: NameRegistry,
    correlators: [TimingCorrelator; 3],
    intervals: IntervalStore,
    window: SnapshotWindow,
    sink: Option<Box<dyn MeasurementSink>>,
    measurements_published: AtomicU64,
    missing_starts: AtomicU64,
    reaped_starts: AtomicU64,
}

impl ActivityTracker<MonotonicClock> {
    /// Tracker on a fresh monotonic clock
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> ActivityTracker<C> {
    pub fn with_clock(config: &TrackerConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let now = clock.now_ns();
        Ok(Self {
            clock,
            names: NameRegistry::new(),
            correlators: ActivityKind::ALL.map(TimingCorrelator::new),
            intervals: IntervalStore::new(config.retention),
            window: SnapshotWindow::new(config.snapshot_window_capacity, now),
            sink: None,
            measurements_published: AtomicU64::new(0),
            missing_starts: AtomicU64::new(0),
            reaped_starts: AtomicU64::new(0),
        })
    }

    /// Publish every completed measurement to `sink`
    pub fn with_sink(mut self, sink: impl MeasurementSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn correlator(&self, kind: ActivityKind) -> &TimingCorrelator {
        &self.correlators[kind.index()]
    }

    pub fn intervals(&self) -> &IntervalStore {
        &self.intervals
    }

    pub fn window(&self) -> &SnapshotWindow {
        &self.window
    }

    /// Begin timing `(name, subject_id)`; a repeated start is coalesced
    ///
    /// Returns `true` if this call recorded the start.
    pub fn track_start(&self, kind: ActivityKind, subject_id: u64, name: &str) -> bool {
        let name = self.names.intern(name);
        let now = self.clock.now_ns();
        self.correlator(kind).start(subject_id, name, now)
    }

    /// Finish timing `(name, subject_id)` and register the completed interval
    ///
    /// The pending entry is removed atomically, so of two racing stops for
    /// the same key exactly one succeeds and records the interval. The stop
    /// time is read, and the interval stored, under the snapshot window lock:
    /// the pair always lands in the snapshot whose bounds cover its end.
    pub fn track_stop(
        &self,
        kind: ActivityKind,
        subject_id: u64,
        name: &str,
    ) -> Result<Duration, TrackerError> {
        let correlator = self.correlator(kind);

        // A name never started was never interned
        let pending = match self.names.get(name) {
            Some(name) => correlator.take(subject_id, &name).map(|start| (name, start)),
            None => Err(correlator.missing_start(subject_id, name)),
        };
        let (name, start) = match pending {
            Ok(pending) => pending,
            Err(err) => {
                self.missing_starts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%kind, subject_id, name, "stop without matching start");
                return Err(err);
            }
        };

        let elapsed = self.window.record_with(subject_id, name.clone(), || {
            let elapsed = Elapsed::new(start, self.clock.now_ns());
            self.intervals.insert(subject_id, name.clone(), elapsed.start, Some(elapsed.end));
            elapsed
        });

        if let Some(sink) = &self.sink {
            sink.publish(Measurement {
                kind,
                subject_id,
                name,
                duration_ns: elapsed.duration_ns(),
            });
            self.measurements_published.fetch_add(1, Ordering::Relaxed);
        }

        Ok(elapsed.duration())
    }

    /// Register `(thread_id, name)` as running since `start_time`
    ///
    /// Stores an open interval and marks the pair in the current snapshot.
    /// A later insert with the same start (e.g. from `track_stop`) closes it.
    pub fn record(&self, thread_id: u64, name: &str, start_time: u64) {
        let name = self.names.intern(name);
        self.intervals.open(thread_id, name.clone(), start_time);
        self.window.record_activity(thread_id, name);
    }

    /// Mark `(thread_id, name)` alive in the current snapshot only
    pub fn record_activity(&self, thread_id: u64, name: &str) -> bool {
        let name = self.names.intern(name);
        self.window.record_activity(thread_id, name)
    }

    /// Finalize the current snapshot and start a new one
    pub fn harvest(&self) -> Snapshot {
        self.window.snapshot_with(|| self.clock.now_ns())
    }

    /// Intervals of `(thread_id, name)` overlapping `[t0, t1]`
    pub fn intervals_in_range(
        &self,
        thread_id: u64,
        name: &str,
        t0: u64,
        t1: u64,
    ) -> Vec<Interval> {
        self.intervals.query(thread_id, name, t0, t1)
    }

    /// Query every participant of `snapshot` over the snapshot's own bounds
    pub fn intervals_for_snapshot(&self, snapshot: &Snapshot) -> Vec<SnapshotIntervals> {
        let (t0, t1) = snapshot.bounds();
        snapshot
            .involved
            .iter()
            .map(|active| SnapshotIntervals {
                thread_id: active.thread_id,
                name: active.name.clone(),
                intervals: self.intervals.query(active.thread_id, &active.name, t0, t1),
            })
            .collect()
    }

    /// Finalized snapshots still in the window, oldest first
    pub fn snapshot_history(&self) -> Vec<Snapshot> {
        self.window.history()
    }

    /// Drop pending starts older than `ttl` across all categories
    pub fn reap_stale(&self, ttl: Duration) -> usize {
        let now = self.clock.now_ns();
        let ttl_ns = u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX);

        let reaped: usize = self
            .correlators
            .iter()
            .map(|correlator| {
                let n = correlator.reap_stale(now, ttl_ns);
                if n > 0 {
                    tracing::debug!(kind = %correlator.kind(), reaped = n, "reaped stale starts");
                }
                n
            })
            .sum();

        self.reaped_starts.fetch_add(reaped as u64, Ordering::Relaxed);
        reaped
    }

    pub fn pending_starts(&self) -> usize {
        self.correlators.iter().map(TimingCorrelator::pending_count).sum()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            pending_starts: self.pending_starts(),
            intervals: self.intervals.len(),
            snapshots_retained: self.window.len(),
            measurements_published: self.measurements_published.load(Ordering::Relaxed),
            missing_starts: self.missing_starts.load(Ordering::Relaxed),
            reaped_starts: self.reaped_starts.load(Ordering::Relaxed),
            distinct_names: self.names.len(),
        }
    }
}
