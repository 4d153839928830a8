//! Log output for the `streamprep` binary.
//!
//! The `stdout` sink owns standard output, so log lines always go to stderr.

use std::io::IsTerminal;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Target prefix shared by the binary and every streamprep crate.
const TARGET_PREFIX: &str = "streamprep";

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `--log-level` applies to streamprep's
/// own crates while dependencies stay at `warn`.
///
/// # Errors
///
/// Returns an error for an unknown level or malformed directives.
pub fn init(log_level: &str) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(rust_log.as_deref(), log_level)?;
    let stderr = std::io::stderr();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(stderr.is_terminal())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
}

fn build_filter(rust_log: Option<&str>, log_level: &str) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid RUST_LOG directives: {directives}"));
    }
    let directives = level_directives(log_level)?;
    EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid --log-level directives: {directives}"))
}

/// A bare level is scoped to streamprep; anything with `=` or `,` is passed
/// through as a directive list.
fn level_directives(log_level: &str) -> Result<String> {
    if log_level.contains(['=', ',']) {
        return Ok(log_level.to_string());
    }
    let level: tracing::Level = log_level.trim().parse().map_err(|_| {
        anyhow!("Invalid --log-level '{log_level}': expected error, warn, info, debug or trace")
    })?;
    Ok(format!(
        "warn,{TARGET_PREFIX}={}",
        level.as_str().to_ascii_lowercase()
    ))
}
