//! Tracker configuration
//!
//! Loaded from TOML, every field optional:
//!
//! ```toml
//! snapshot_window_capacity = 10
//! retention = { max_per_key = 4096 }   # or "unbounded"
//! measurement_queue_capacity = 8192
//! stale_start_ttl_ms = 30000
//! reaper_interval_ms = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// How long the interval store keeps history
///
/// `Unbounded` keeps every interval for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    Unbounded,
    /// Keep at most N intervals per (thread, name), evicting the oldest start
    MaxPerKey(usize),
}

/// Configuration consumed by [`crate::tracker::ActivityTracker`]
///
/// # Example
/// ```
/// use lapse::config::{RetentionPolicy, TrackerConfig};
///
/// let config = TrackerConfig::default();
/// assert_eq!(config.snapshot_window_capacity, 10);
/// assert_eq!(config.retention, RetentionPolicy::Unbounded);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Number of finalized snapshots retained before the oldest is evicted
    pub snapshot_window_capacity: usize,

    /// Interval store retention
    pub retention: RetentionPolicy,

    /// Capacity of the outbound measurement queue
    pub measurement_queue_capacity: usize,

    /// Pending starts older than this are reaped; `None` disables the reaper
    pub stale_start_ttl_ms: Option<u64>,

    /// Sweep period of the stale-start reaper
    pub reaper_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            snapshot_window_capacity: 10,
            retention: RetentionPolicy::Unbounded,
            measurement_queue_capacity: 8192,
            stale_start_ttl_ms: None,
            reaper_interval_ms: 1000,
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_window_capacity == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_window_capacity must be >= 1".to_string(),
            ));
        }

        if let RetentionPolicy::MaxPerKey(0) = self.retention {
            return Err(ConfigError::Invalid(
                "retention.max_per_key must be >= 1".to_string(),
            ));
        }

        if self.measurement_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "measurement_queue_capacity must be >= 1".to_string(),
            ));
        }

        if self.stale_start_ttl_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "stale_start_ttl_ms must be >= 1 when set".to_string(),
            ));
        }

        if self.reaper_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reaper_interval_ms must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn stale_start_ttl(&self) -> Option<Duration> {
        self.stale_start_ttl_ms.map(Duration::from_millis)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}
