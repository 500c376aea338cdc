use anyhow::{Context, Result};
use clap::Parser;
use lapse::cli::{Cli, OutputFormat};
use lapse::config::TrackerConfig;
use lapse::{output, replay};
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Resolve the tracker configuration from the config file and CLI overrides
fn load_config(args: &Cli) -> Result<TrackerConfig> {
    let mut config = match &args.config {
        Some(path) => TrackerConfig::from_file(path)?,
        None => TrackerConfig::default(),
    };

    if let Some(capacity) = args.snapshot_capacity {
        config.snapshot_window_capacity = capacity;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;
    let events = replay::load_trace(&args.trace)?;
    tracing::debug!(events = events.len(), ?config, "replaying trace");

    let report = replay::Replayer::new(&config)?.run(&events);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let written = match args.format {
        OutputFormat::Text => output::write_text(&report, &mut out),
        OutputFormat::Json => output::write_json(&report, &mut out),
    };
    written.context("failed to write report")?;
    out.flush()?;

    if args.strict && report.stats.missing_starts > 0 {
        anyhow::bail!(
            "{} stop event(s) had no matching start",
            report.stats.missing_starts
        );
    }

    Ok(())
}
