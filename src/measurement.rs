//! Outbound measurements
//!
//! Every successful `track_stop` yields a [`Measurement`]. The tracker hands
//! it to a [`MeasurementSink`]; what happens next (encoding, connection
//! handling, retries) belongs to the transport layer.
//!
//! [`MeasurementQueue`] is the stock sink: a bounded lock-free queue that
//! decouples the instrumented thread from the transport thread.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ OBSERVED THREAD (hot path)                   │
//! │   leave() → track_stop() → queue.publish()   │
//! └──────────────────────────────────────────────┘
//!                      │ crossbeam ArrayQueue
//!                      ▼
//! ┌──────────────────────────────────────────────┐
//! │ TRANSPORT THREAD (cold path)                 │
//! │   batch = queue.drain(100); send(batch)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! When the queue is full the measurement is dropped and counted; the
//! observed thread never blocks on the transport.

use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::timing::ActivityKind;

/// A completed, timed activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: ActivityKind,
    pub subject_id: u64,
    pub name: Arc<str>,
    pub duration_ns: u64,
}

/// Receiver of completed measurements
///
/// Called on the instrumented thread; implementations must not block.
pub trait MeasurementSink: Send + Sync {
    fn publish(&self, measurement: Measurement);
}

impl<S: MeasurementSink + ?Sized> MeasurementSink for Arc<S> {
    fn publish(&self, measurement: Measurement) {
        (**self).publish(measurement)
    }
}

/// Bounded lock-free measurement queue
///
/// # Example
///
/// ```
/// use lapse::measurement::{Measurement, MeasurementQueue, MeasurementSink};
/// use lapse::timing::ActivityKind;
///
/// let queue = MeasurementQueue::new(1024);
/// queue.publish(Measurement {
///     kind: ActivityKind::Method,
///     subject_id: 1,
///     name: "Main".into(),
///     duration_ns: 250,
/// });
///
/// let batch = queue.drain(100);
/// assert_eq!(batch.len(), 1);
/// ```
#[derive(Debug)]
pub struct MeasurementQueue {
    queue: ArrayQueue<Measurement>,
    total_pushed: AtomicU64,
    total_dropped: AtomicU64,
}

impl MeasurementQueue {
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Measurement queue capacity must be > 0");

        Self {
            queue: ArrayQueue::new(capacity),
            total_pushed: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    /// Pop up to `max` measurements, oldest first
    pub fn drain(&self, max: usize) -> Vec<Measurement> {
        let mut batch = Vec::with_capacity(max.min(self.queue.len()));
        while batch.len() < max {
            match self.queue.pop() {
                Some(measurement) => batch.push(measurement),
                None => break,
            }
        }
        batch
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}

impl MeasurementSink for MeasurementQueue {
    fn publish(&self, measurement: Measurement) {
        self.total_pushed.fetch_add(1, Ordering::Relaxed);

        if let Err(dropped) = self.queue.push(measurement) {
            let total = self.total_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(
                kind = %dropped.kind,
                subject_id = dropped.subject_id,
                name = %dropped.name,
                total_dropped = total,
                "measurement queue full, measurement dropped"
            );
        }
    }
}

/// Measurement queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub total_pushed: u64,
    pub total_dropped: u64,
    pub current_size: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// Calculate drop rate (0.0 to 1.0)
    pub fn drop_rate(&self) -> f64 {
        if self.total_pushed == 0 {
            0.0
        } else {
            self.total_dropped as f64 / self.total_pushed as f64
        }
    }

    /// Calculate queue utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        self.current_size as f64 / self.capacity as f64
    }
}
