//! Tracing initialisation and structured log helpers.
//!
//! `RUST_LOG` always wins; otherwise the filter defaults to
//! `forgeloop=info,warn` (or `forgeloop=debug,info` when verbose).

use std::io::IsTerminal;
use std::str::FromStr;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected compact or json)")),
        }
    }
}

/// Whether colored console output should be used.
///
/// True only when stdout is a terminal and `NO_COLOR` is unset.
#[must_use]
pub fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("forgeloop=debug,info")
            } else {
                EnvFilter::try_new("forgeloop=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise the global tracing subscriber with the compact format.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing_with_format(verbose, LogFormat::Compact)
}

/// Initialise the global tracing subscriber.
///
/// Logs go to stderr so stdout stays free for run summaries. Fails if a
/// subscriber is already installed.
pub fn init_tracing_with_format(
    verbose: bool,
    format: LogFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = default_filter(verbose);

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_ansi(std::io::stderr().is_terminal())
                    .compact(),
            )
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(false),
            )
            .try_init()?,
    }

    Ok(())
}

pub fn log_stage_start(run_id: &str, stage: &str) {
    info!(run_id = %run_id, stage = %stage, "Starting stage");
}

pub fn log_stage_complete(run_id: &str, stage: &str, status: &str, duration_ms: u128) {
    info!(
        run_id = %run_id,
        stage = %stage,
        status = %status,
        duration_ms = %duration_ms,
        "Stage completed"
    );
}

pub fn log_stage_error(run_id: &str, stage: &str, error: &str, duration_ms: u128) {
    error!(
        run_id = %run_id,
        stage = %stage,
        duration_ms = %duration_ms,
        error = %error,
        "Stage faulted"
    );
}

/// Log one verification iteration. Failing iterations log at `warn`.
pub fn log_iteration(run_id: &str, iteration: u32, passed: bool, total: u32, failed: u32) {
    if passed {
        info!(
            run_id = %run_id,
            iteration,
            total,
            failed,
            "Verification passed"
        );
    } else {
        warn!(
            run_id = %run_id,
            iteration,
            total,
            failed,
            "Verification failed"
        );
    }
}
