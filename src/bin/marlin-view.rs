//! marlin-view: terminal dashboard for a running marlin-host.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use marlin_telemetry::config::ViewerConfig;
use marlin_telemetry::{logging, viewer};

#[derive(Parser, Debug)]
#[command(name = "marlin-view", version, about = "Live acceleration chart for a Marlin host")]
struct Args {
    /// Host address (overrides the configuration)
    host: Option<String>,

    /// Host port (overrides the configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file (defaults to config/viewer.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_or_default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    logging::init_quiet(&config.logging.level, config.logging.file.as_deref())?;

    // only reaches us before raw mode; afterwards Ctrl+C arrives as a key
    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.cancel();
        }
    });

    viewer::run(config, cancel).await
}
