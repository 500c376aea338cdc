//! Deterministic replay of recorded activity traces
//!
//! A trace is a JSON-lines file, one host event per line:
//!
//! ```text
//! {"op":"start","kind":"method","subject_id":1,"name":"Main","at":100}
//! {"op":"record","thread_id":1,"name":"Main","at":100}
//! {"op":"stop","kind":"method","subject_id":1,"name":"Main","at":250}
//! {"op":"snapshot","at":300}
//! {"op":"query","thread_id":1,"name":"Main","from":0,"to":500}
//! ```
//!
//! Each event first moves a [`ManualClock`] to its `at` timestamp and then
//! drives the tracker exactly as the host-integration layer would, so the
//! replayed durations and interval bounds are the recorded ones. Blank lines
//! and `#` comments are skipped.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::ManualClock;
use crate::config::TrackerConfig;
use crate::error::{ConfigError, ReplayError, TrackerError};
use crate::interval_store::Interval;
use crate::measurement::{Measurement, MeasurementQueue};
use crate::snapshot::Snapshot;
use crate::timing::ActivityKind;
use crate::tracker::{ActivityTracker, SnapshotIntervals, TrackerStats};

/// One recorded host event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    Start {
        kind: ActivityKind,
        subject_id: u64,
        name: String,
        at: u64,
    },
    Stop {
        kind: ActivityKind,
        subject_id: u64,
        name: String,
        at: u64,
    },
    Record {
        thread_id: u64,
        name: String,
        at: u64,
    },
    Snapshot {
        at: u64,
    },
    Query {
        thread_id: u64,
        name: String,
        from: u64,
        to: u64,
    },
}

/// Parse a JSON-lines trace
pub fn parse_trace(input: &str) -> Result<Vec<TraceEvent>, ReplayError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ReplayError::Parse {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Read and parse a JSON-lines trace file
pub fn load_trace(path: &Path) -> Result<Vec<TraceEvent>, ReplayError> {
    let input = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_trace(&input)
}

/// Observable result of one replayed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEntry {
    Measurement(Measurement),
    MissingStart {
        kind: ActivityKind,
        subject_id: u64,
        name: String,
        at: u64,
    },
    Snapshot {
        snapshot: Snapshot,
        intervals: Vec<SnapshotIntervals>,
    },
    Query {
        thread_id: u64,
        name: String,
        from: u64,
        to: u64,
        intervals: Vec<Interval>,
    },
}

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub entries: Vec<ReplayEntry>,
    pub stats: TrackerStats,
}

impl ReplayReport {
    pub fn measurements(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter().filter_map(|entry| match entry {
            ReplayEntry::Measurement(m) => Some(m),
            _ => None,
        })
    }
}

/// Tracker driven by recorded timestamps
pub struct Replayer {
    clock: Arc<ManualClock>,
    queue: Arc<MeasurementQueue>,
    tracker: ActivityTracker<Arc<ManualClock>>,
    stale_start_ttl: Option<Duration>,
}

impl Replayer {
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        let clock = Arc::new(ManualClock::new(0));
        let queue = Arc::new(MeasurementQueue::new(config.measurement_queue_capacity));
        let tracker = ActivityTracker::with_clock(config, clock.clone())?.with_sink(queue.clone());

        Ok(Self {
            clock,
            queue,
            tracker,
            stale_start_ttl: config.stale_start_ttl(),
        })
    }

    pub fn tracker(&self) -> &ActivityTracker<Arc<ManualClock>> {
        &self.tracker
    }

    /// Apply one event, returning what it produced (starts and records produce nothing)
    pub fn apply(&self, event: &TraceEvent) -> Option<ReplayEntry> {
        match event {
            TraceEvent::Start {
                kind,
                subject_id,
                name,
                at,
            } => {
                self.clock.set(*at);
                self.tracker.track_start(*kind, *subject_id, name);
                None
            }
            TraceEvent::Stop {
                kind,
                subject_id,
                name,
                at,
            } => {
                self.clock.set(*at);
                match self.tracker.track_stop(*kind, *subject_id, name) {
                    Ok(_) => self.queue.drain(1).pop().map(ReplayEntry::Measurement),
                    Err(TrackerError::MissingStart { .. }) => Some(ReplayEntry::MissingStart {
                        kind: *kind,
                        subject_id: *subject_id,
                        name: name.clone(),
                        at: *at,
                    }),
                }
            }
            TraceEvent::Record {
                thread_id,
                name,
                at,
            } => {
                self.clock.set(*at);
                self.tracker.record(*thread_id, name, *at);
                None
            }
            TraceEvent::Snapshot { at } => {
                self.clock.set(*at);
                // Trace time stands in for the reaper thread's wall clock
                if let Some(ttl) = self.stale_start_ttl {
                    self.tracker.reap_stale(ttl);
                }
                let snapshot = self.tracker.harvest();
                let intervals = self.tracker.intervals_for_snapshot(&snapshot);
                Some(ReplayEntry::Snapshot {
                    snapshot,
                    intervals,
                })
            }
            TraceEvent::Query {
                thread_id,
                name,
                from,
                to,
            } => Some(ReplayEntry::Query {
                thread_id: *thread_id,
                name: name.clone(),
                from: *from,
                to: *to,
                intervals: self.tracker.intervals_in_range(*thread_id, name, *from, *to),
            }),
        }
    }

    /// Apply every event in order
    pub fn run<'a>(self, events: impl IntoIterator<Item = &'a TraceEvent>) -> ReplayReport {
        let entries = events
            .into_iter()
            .filter_map(|event| self.apply(event))
            .collect();

        ReplayReport {
            entries,
            stats: self.tracker.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"
# two overlapping methods on subject 1
{"op":"start","kind":"method","subject_id":1,"name":"Main","at":100}
{"op":"start","kind":"method","subject_id":1,"name":"Helper","at":120}
{"op":"stop","kind":"method","subject_id":1,"name":"Helper","at":130}
{"op":"stop","kind":"method","subject_id":1,"name":"Main","at":250}

{"op":"snapshot","at":300}
{"op":"query","thread_id":1,"name":"Main","from":150,"to":160}
{"op":"stop","kind":"assembly","subject_id":9,"name":"System.Core","at":310}
"#;

    #[test]
    fn test_parse_trace_skips_blank_and_comments() {
        let events = parse_trace(TRACE).unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(
            events[0],
            TraceEvent::Start {
                kind: ActivityKind::Method,
                subject_id: 1,
                name: "Main".to_string(),
                at: 100,
            }
        );
        assert_eq!(events[4], TraceEvent::Snapshot { at: 300 });
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = parse_trace("{\"op\":\"snapshot\",\"at\":1}\n{\"op\":\"bogus\"}\n").unwrap_err();
        match err {
            ReplayError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_replay_produces_measurements_snapshot_and_query() {
        let events = parse_trace(TRACE).unwrap();
        let report = Replayer::new(&TrackerConfig::default()).unwrap().run(&events);

        let durations: Vec<(String, u64)> = report
            .measurements()
            .map(|m| (m.name.to_string(), m.duration_ns))
            .collect();
        assert_eq!(
            durations,
            vec![("Helper".to_string(), 10), ("Main".to_string(), 150)]
        );

        let snapshot = report
            .entries
            .iter()
            .find_map(|entry| match entry {
                ReplayEntry::Snapshot { snapshot, intervals } => Some((snapshot, intervals)),
                _ => None,
            })
            .unwrap();
        assert_eq!(snapshot.0.start_time, 0);
        assert_eq!(snapshot.0.end_time, Some(300));
        assert_eq!(snapshot.0.involved.len(), 2);
        assert_eq!(snapshot.1.len(), 2);

        assert!(report.entries.contains(&ReplayEntry::Query {
            thread_id: 1,
            name: "Main".to_string(),
            from: 150,
            to: 160,
            intervals: vec![Interval::closed(100, 250)],
        }));

        assert!(report.entries.contains(&ReplayEntry::MissingStart {
            kind: ActivityKind::Assembly,
            subject_id: 9,
            name: "System.Core".to_string(),
            at: 310,
        }));

        assert_eq!(report.stats.missing_starts, 1);
        assert_eq!(report.stats.pending_starts, 0);
        assert_eq!(report.stats.measurements_published, 2);
    }

    #[test]
    fn test_snapshot_reaps_stale_starts_when_ttl_set() {
        let config = TrackerConfig {
            stale_start_ttl_ms: Some(1),
            ..Default::default()
        };
        let events = parse_trace(
            r#"
{"op":"start","kind":"method","subject_id":1,"name":"Leaked","at":0}
{"op":"start","kind":"method","subject_id":2,"name":"Fresh","at":1500000}
{"op":"snapshot","at":2000000}
"#,
        )
        .unwrap();

        let report = Replayer::new(&config).unwrap().run(&events);
        assert_eq!(report.stats.reaped_starts, 1);
        assert_eq!(report.stats.pending_starts, 1);
    }

    #[test]
    fn test_stop_before_start_in_trace_time_is_not_inverted() {
        let events = parse_trace(
            r#"
{"op":"start","kind":"method","subject_id":1,"name":"Skewed","at":500}
{"op":"stop","kind":"method","subject_id":1,"name":"Skewed","at":100}
{"op":"query","thread_id":1,"name":"Skewed","from":200,"to":1000}
"#,
        )
        .unwrap();

        let report = Replayer::new(&TrackerConfig::default()).unwrap().run(&events);
        assert_eq!(report.measurements().next().map(|m| m.duration_ns), Some(0));
        assert!(report.entries.contains(&ReplayEntry::Query {
            thread_id: 1,
            name: "Skewed".to_string(),
            from: 200,
            to: 1000,
            intervals: Vec::new(),
        }));
    }

    #[test]
    fn test_record_event_opens_interval() {
        let replayer = Replayer::new(&TrackerConfig::default()).unwrap();
        replayer.apply(&TraceEvent::Record {
            thread_id: 4,
            name: "Spin".to_string(),
            at: 50,
        });

        let entry = replayer
            .apply(&TraceEvent::Query {
                thread_id: 4,
                name: "Spin".to_string(),
                from: 1_000,
                to: 2_000,
            })
            .unwrap();
        match entry {
            ReplayEntry::Query { intervals, .. } => assert_eq!(intervals, vec![Interval::open(50)]),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_load_trace_missing_file() {
        let err = load_trace(Path::new("/nonexistent/trace.jsonl")).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
    }
}
