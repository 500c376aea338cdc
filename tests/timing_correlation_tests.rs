//! Integration tests for start/stop correlation through the tracker façade
//!
//! # Test Coverage
//!
//! - ✅ Duration equals stop time minus start time
//! - ✅ Exactly one interval per completed start/stop pair
//! - ✅ Duplicate starts coalesce into the first
//! - ✅ Stop without start fails with MissingStart and changes nothing
//! - ✅ Ledger entries are removed on stop

use lapse::clock::ManualClock;
use lapse::config::TrackerConfig;
use lapse::error::TrackerError;
use lapse::interval_store::Interval;
use lapse::timing::ActivityKind;
use lapse::tracker::ActivityTracker;
use std::sync::Arc;
use std::time::Duration;

fn tracker() -> (Arc<ManualClock>, ActivityTracker<Arc<ManualClock>>) {
    let clock = Arc::new(ManualClock::new(0));
    let tracker = ActivityTracker::with_clock(&TrackerConfig::default(), clock.clone()).unwrap();
    (clock, tracker)
}

#[test]
fn test_duration_matches_clock_delta() {
    let cases = [(0u64, 1u64), (100, 350), (1_000_000, 1_000_001), (5, 5_000_000_000)];

    for (t0, t1) in cases {
        let (clock, tracker) = tracker();
        clock.set(t0);
        tracker.track_start(ActivityKind::Method, 42, "Compute");
        clock.set(t1);

        let duration = tracker.track_stop(ActivityKind::Method, 42, "Compute").unwrap();
        assert_eq!(duration, Duration::from_nanos(t1 - t0));
        assert_eq!(
            tracker.intervals().intervals_for(42, "Compute"),
            vec![Interval::closed(t0, t1)]
        );
    }
}

#[test]
fn test_duplicate_start_measured_from_first() {
    let (clock, tracker) = tracker();

    clock.set(1_000);
    assert!(tracker.track_start(ActivityKind::Method, 1, "Recursive"));
    clock.set(1_500);
    assert!(!tracker.track_start(ActivityKind::Method, 1, "Recursive"));
    assert_eq!(tracker.pending_starts(), 1);

    clock.set(2_000);
    let duration = tracker.track_stop(ActivityKind::Method, 1, "Recursive").unwrap();
    assert_eq!(duration.as_nanos(), 1_000);
    assert_eq!(
        tracker.intervals().intervals_for(1, "Recursive"),
        vec![Interval::closed(1_000, 2_000)]
    );
}

#[test]
fn test_stop_without_start_leaves_ledger_unchanged() {
    let (clock, tracker) = tracker();
    tracker.track_start(ActivityKind::Method, 1, "Main");
    tracker.track_start(ActivityKind::Assembly, 2, "mscorlib");
    let before = tracker.stats();

    clock.set(10);
    let err = tracker.track_stop(ActivityKind::Method, 99, "Main").unwrap_err();
    assert_eq!(
        err,
        TrackerError::MissingStart {
            kind: ActivityKind::Method,
            subject_id: 99,
            name: "Main".to_string(),
        }
    );

    let after = tracker.stats();
    assert_eq!(after.pending_starts, before.pending_starts);
    assert_eq!(after.intervals, 0);
    assert!(tracker.correlator(ActivityKind::Method).is_pending(1, &Arc::from("Main")));
    assert!(!tracker.window().current().contains(99, "Main"));
}

#[test]
fn test_ledger_does_not_grow_across_calls() {
    let (clock, tracker) = tracker();

    for i in 0..10_000u64 {
        clock.set(i * 2);
        tracker.track_start(ActivityKind::Method, i % 16, "Loop");
        clock.set(i * 2 + 1);
        tracker.track_stop(ActivityKind::Method, i % 16, "Loop").unwrap();
    }

    assert_eq!(tracker.pending_starts(), 0);
    assert_eq!(tracker.stats().distinct_names, 1);
}

#[test]
fn test_restart_after_stop_is_a_new_interval() {
    let (clock, tracker) = tracker();

    tracker.track_start(ActivityKind::Method, 1, "Tick");
    clock.set(10);
    tracker.track_stop(ActivityKind::Method, 1, "Tick").unwrap();
    clock.set(20);
    assert!(tracker.track_start(ActivityKind::Method, 1, "Tick"));
    clock.set(35);
    assert_eq!(
        tracker.track_stop(ActivityKind::Method, 1, "Tick").unwrap(),
        Duration::from_nanos(15)
    );

    assert_eq!(
        tracker.intervals().intervals_for(1, "Tick"),
        vec![Interval::closed(0, 10), Interval::closed(20, 35)]
    );
}

#[test]
fn test_each_kind_has_its_own_ledger() {
    let (clock, tracker) = tracker();

    for kind in ActivityKind::ALL {
        tracker.track_start(kind, 1, "Shared");
    }
    assert_eq!(tracker.pending_starts(), 3);

    clock.set(100);
    for kind in ActivityKind::ALL {
        assert_eq!(tracker.track_stop(kind, 1, "Shared").unwrap().as_nanos(), 100);
    }
    assert_eq!(tracker.pending_starts(), 0);
}
