//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and environment fallbacks
//! - Load the config file and overlay the command-line values
//! - Either write the effective configuration (`--genconf`) or run one
//!   reconciliation on a tokio runtime
//!
//! The CLI layer is thin; all repository and forge work happens in
//! [`crate::engine`].

pub mod args;

pub use args::Cli;

use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::core::config::Config;
use crate::engine::ReconciliationDriver;
use crate::telemetry::{self, Verbosity};

/// Exit status of a run whose report carries an error flag.
pub const EXIT_REPORTED_ERROR: u8 = 2;

/// Build the effective configuration from the file and the command line.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply_to(&mut config);
    config.normalize_blanks();
    Ok(config)
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Returns the process
/// exit status for a completed run.
pub fn run() -> Result<u8> {
    let cli = Cli::parse_args();
    telemetry::init(Verbosity::from_flags(cli.quiet, cli.debug));

    if cli.expect_escaped_input {
        info!("detected --expect-escaped-input, removed surrounding quotes from arguments");
    }

    let config = resolve_config(&cli)?;

    if let Some(path) = &cli.genconf {
        config
            .write(path)
            .with_context(|| format!("failed to write configuration to {}", path.display()))?;
        info!(path = %path.display(), "wrote configuration");
        return Ok(0);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let report = runtime
        .block_on(ReconciliationDriver::new(config).run())
        .context("reconciliation failed")?;

    if let Some(path) = &cli.status_file {
        let json = report.to_json().context("failed to serialize status report")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write status report to {}", path.display()))?;
    }

    Ok(if report.error { EXIT_REPORTED_ERROR } else { 0 })
}
