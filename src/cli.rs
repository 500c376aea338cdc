//! CLI argument parsing for lapse

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for replay reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON lines for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "lapse")]
#[command(version)]
#[command(about = "Replay recorded activity traces through the timing and snapshot engine", long_about = None)]
pub struct Cli {
    /// JSON-lines activity trace to replay
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// TOML tracker configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of finalized snapshots to retain (overrides the config file)
    #[arg(long = "snapshot-capacity", value_name = "N")]
    pub snapshot_capacity: Option<usize>,

    /// Exit with failure if any stop had no matching start
    #[arg(long = "strict")]
    pub strict: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_trace() {
        let cli = Cli::parse_from(["lapse", "trace.jsonl"]);
        assert_eq!(cli.trace, PathBuf::from("trace.jsonl"));
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
        assert!(cli.snapshot_capacity.is_none());
        assert!(!cli.strict);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_requires_trace() {
        assert!(Cli::try_parse_from(["lapse"]).is_err());
    }

    #[test]
    fn test_cli_json_format() {
        let cli = Cli::parse_from(["lapse", "--format", "json", "trace.jsonl"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_config_and_capacity() {
        let cli = Cli::parse_from([
            "lapse",
            "-c",
            "lapse.toml",
            "--snapshot-capacity",
            "3",
            "trace.jsonl",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("lapse.toml")));
        assert_eq!(cli.snapshot_capacity, Some(3));
    }

    #[test]
    fn test_cli_strict_and_debug_flags() {
        let cli = Cli::parse_from(["lapse", "--strict", "--debug", "trace.jsonl"]);
        assert!(cli.strict);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["lapse", "--format", "csv", "trace.jsonl"]).is_err());
    }
}
