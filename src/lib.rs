//! Lapse - timing correlation and sliding-window activity snapshots
//!
//! This library is the telemetry core of a profiling agent. It pairs
//! "activity started" / "activity finished" events from an instrumented host
//! by subject id, computes elapsed durations, and keeps a bounded window of
//! snapshots recording which threads ran which activities, backed by a full
//! interval history that answers "what was running between T0 and T1".

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod interval_store;
pub mod measurement;
pub mod names;
pub mod output;
pub mod reaper;
pub mod replay;
pub mod snapshot;
pub mod timing;
pub mod tracker;
