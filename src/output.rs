//! Text and JSON rendering of replay reports

use std::io::{self, Write};

use crate::interval_store::Interval;
use crate::replay::{ReplayEntry, ReplayReport};
use crate::tracker::TrackerStats;

/// Render an interval as `[start, end)`, or `[start, open)` while still running
pub fn format_interval(interval: &Interval) -> String {
    match interval.end {
        Some(end) => format!("[{}, {})", interval.start, end),
        None => format!("[{}, open)", interval.start),
    }
}

fn format_intervals(intervals: &[Interval]) -> String {
    if intervals.is_empty() {
        "(none)".to_string()
    } else {
        intervals
            .iter()
            .map(format_interval)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Human-readable report, one line per entry plus a summary
pub fn write_text<W: Write>(report: &ReplayReport, out: &mut W) -> io::Result<()> {
    for entry in &report.entries {
        match entry {
            ReplayEntry::Measurement(m) => {
                writeln!(
                    out,
                    "measurement {} {} subject={} duration_ns={}",
                    m.kind, m.name, m.subject_id, m.duration_ns
                )?;
            }
            ReplayEntry::MissingStart {
                kind,
                subject_id,
                name,
                at,
            } => {
                writeln!(out, "missing-start {} {} subject={} at={}", kind, name, subject_id, at)?;
            }
            ReplayEntry::Snapshot {
                snapshot,
                intervals,
            } => {
                let (start, end) = snapshot.bounds();
                writeln!(
                    out,
                    "snapshot [{}, {}] involved={}",
                    start,
                    end,
                    snapshot.involved.len()
                )?;
                for participant in intervals {
                    writeln!(
                        out,
                        "  thread {} {}: {}",
                        participant.thread_id,
                        participant.name,
                        format_intervals(&participant.intervals)
                    )?;
                }
            }
            ReplayEntry::Query {
                thread_id,
                name,
                from,
                to,
                intervals,
            } => {
                writeln!(
                    out,
                    "query thread={} name={} range=[{}, {}]: {}",
                    thread_id,
                    name,
                    from,
                    to,
                    format_intervals(intervals)
                )?;
            }
        }
    }

    let stats = &report.stats;
    writeln!(
        out,
        "summary: measurements={} missing_starts={} pending_starts={} intervals={} snapshots_retained={}",
        stats.measurements_published,
        stats.missing_starts,
        stats.pending_starts,
        stats.intervals,
        stats.snapshots_retained
    )
}

fn summary_value(stats: &TrackerStats) -> serde_json::Result<serde_json::Value> {
    let mut value = serde_json::to_value(stats)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("type".to_string(), "summary".into());
    }
    Ok(value)
}

/// JSON lines: one object per entry, then a `"type":"summary"` object
pub fn write_json<W: Write>(report: &ReplayReport, out: &mut W) -> io::Result<()> {
    for entry in &report.entries {
        serde_json::to_writer(&mut *out, entry)?;
        writeln!(out)?;
    }
    serde_json::to_writer(&mut *out, &summary_value(&report.stats)?)?;
    writeln!(out)
}
