//! tracing subscriber setup shared by both binaries

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set
fn filter(level: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{}'", level)),
    }
}

/// log to stdout
pub fn init(level: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_target(false)
        .init();
    Ok(())
}

/// log to stderr, or append to `file` when given (stdout belongs to the terminal ui)
pub fn init_quiet(level: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let filter = filter(level)?;
    match file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
