//! Error types for the tracker and its configuration

use std::path::PathBuf;
use thiserror::Error;

use crate::timing::ActivityKind;

/// Errors surfaced to the host-integration layer
///
/// A duplicate start is not an error: it is coalesced into the first start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("stop for {kind} '{name}' (subject {subject_id}) has no matching start")]
    MissingStart {
        kind: ActivityKind,
        subject_id: u64,
        name: String,
    },
}

/// Errors loading or validating a [`crate::config::TrackerConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors reading a JSON-lines event trace
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_start_message() {
        let err = TrackerError::MissingStart {
            kind: ActivityKind::Method,
            subject_id: 42,
            name: "Main".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "stop for method 'Main' (subject 42) has no matching start"
        );
    }

    #[test]
    fn test_invalid_config_message() {
        let err = ConfigError::Invalid("snapshot_window_capacity must be >= 1".to_string());
        assert!(err.to_string().contains("snapshot_window_capacity"));
    }
}
