//! Background sweeper for leaked pending starts
//!
//! Every start is expected to be matched by a stop. When the host loses a
//! leave event (an exception unwinding past the hook, a thread torn down
//! mid-call) the pending start would otherwise stay in the ledger forever.
//! The reaper drops starts older than a TTL on a fixed period.
//!
//! The sweep runs on its own thread and only touches the ledger through
//! [`ActivityTracker::reap_stale`], which holds one shard lock at a time.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::tracker::ActivityTracker;

/// Handle to the reaper thread; dropping it stops the thread
pub struct StaleStartReaper {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    sweeps: Arc<AtomicU64>,
}

impl StaleStartReaper {
    /// Sweep `tracker` every `interval`, dropping starts older than `ttl`
    pub fn spawn<C: Clock + 'static>(
        tracker: Arc<ActivityTracker<C>>,
        ttl: Duration,
        interval: Duration,
    ) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let sweeps = Arc::new(AtomicU64::new(0));

        let worker_shutdown = shutdown.clone();
        let worker_sweeps = sweeps.clone();
        let handle = thread::Builder::new()
            .name("lapse-reaper".to_string())
            .spawn(move || {
                Self::worker(&tracker, ttl, interval, &worker_shutdown, &worker_sweeps);
            })?;

        tracing::debug!(?ttl, ?interval, "stale-start reaper started");

        Ok(Self {
            handle: Some(handle),
            shutdown,
            sweeps,
        })
    }

    /// Spawn per `config`; `Ok(None)` when `stale_start_ttl_ms` is unset
    pub fn from_config<C: Clock + 'static>(
        tracker: Arc<ActivityTracker<C>>,
        config: &TrackerConfig,
    ) -> io::Result<Option<Self>> {
        match config.stale_start_ttl() {
            Some(ttl) => Self::spawn(tracker, ttl, config.reaper_interval()).map(Some),
            None => Ok(None),
        }
    }

    /// Completed sweeps so far
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }

    fn worker<C: Clock>(
        tracker: &ActivityTracker<C>,
        ttl: Duration,
        interval: Duration,
        shutdown: &AtomicBool,
        sweeps: &AtomicU64,
    ) {
        while !shutdown.load(Ordering::SeqCst) {
            tracker.reap_stale(ttl);
            sweeps.fetch_add(1, Ordering::Relaxed);

            // park_timeout may wake early; keep waiting until the deadline or shutdown
            let deadline = Instant::now() + interval;
            while !shutdown.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::park_timeout(deadline - now);
            }
        }
    }
}

impl Drop for StaleStartReaper {
    fn drop(&mut self) {
        self.stop();
    }
}
