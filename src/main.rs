//! ==============================================================================
//! main.rs - marlin-host entry point
//! ==============================================================================
//!
//! purpose:
//!     runs on the sensor rig. samples the bus, broadcasts every snapshot to
//!     connected viewers and keeps the enclosure fan running.
//!
//! responsibilities:
//!     - load configuration and start logging
//!     - bind the endpoint, so a taken port fails before any hardware is touched
//!     - bring up the hardware layer and switch the fan on
//!     - open the sensor bank (real devices or simulated)
//!     - run the sampler into the broadcast hub
//!     - serve the websocket endpoint until Ctrl+C
//!     - shut down in order: sampler, viewers, fan
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                   marlin-host (this file)                 │
//!     │  ┌─────────────┐     ┌─────────────┐    ┌─────────────┐  │
//!     │  │  sampler    │ ──► │    hub      │ ◄─ │  server     │  │
//!     │  │ (10ms tick) │     │ (broadcast) │    │ (port 5000) │  │
//!     │  └──────┬──────┘     └─────────────┘    └─────────────┘  │
//!     │         │                                                 │
//!     │   ┌─────┴─────┐                                           │
//!     │   │  sensors  │ <- sensors/*  (i2c via hal.rs)            │
//!     │   └───────────┘                                           │
//!     └──────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use marlin_telemetry::config::HostConfig;
use marlin_telemetry::hal::{Hal, HardwareProvider};
use marlin_telemetry::logging;
use marlin_telemetry::sampler::Sampler;
use marlin_telemetry::sensors::SensorBank;
use marlin_telemetry::server::{self, ServerState, ViewerHub};

#[derive(Parser, Debug)]
#[command(name = "marlin-host", version, about = "Sample the Marlin sensor bus and stream it to viewers")]
struct Args {
    /// Configuration file (defaults to config/host.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("===========================================================");
    println!("  Marlin Telemetry Host");
    println!("===========================================================");

    // step 1: configuration and logging
    let config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::load_or_default(),
    };
    logging::init(&config.logging.level)?;
    config.print_summary();

    // step 2: claim the endpoint before touching hardware
    let listener = server::bind(&config.server).await?;
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    // step 3: hardware layer and fan
    let hal: Arc<dyn HardwareProvider> = Arc::new(Hal::new().context("Failed to open hardware layer")?);
    if config.fan.enabled {
        match hal.set_fan(config.fan.gpio_pin, true) {
            Ok(()) => println!("[STARTUP] ✓ Fan on (GPIO {})", config.fan.gpio_pin),
            Err(e) => tracing::error!("[STARTUP] Fan could not be switched on: {}", e),
        }
    }

    // step 4: sensors
    let bank = if config.sensors.simulate || !cfg!(feature = "hardware") {
        println!("[STARTUP] Using simulated sensors");
        SensorBank::simulated(config.sampler.adc_settle())
    } else {
        SensorBank::probe(Arc::clone(&hal), &config.sensors, config.sampler.adc_settle())
    };
    println!("[STARTUP] ✓ {} sensors online", bank.len());

    // step 5: sampler into the hub
    let cancel = CancellationToken::new();
    let hub = Arc::new(ViewerHub::with_send_timeout(config.hub.send_timeout()));
    let sampler = {
        let hub = Arc::clone(&hub);
        let cancel = cancel.clone();
        let sampler = Sampler::new(bank, &config.sampler).show_data(config.logging.show_sensor_data);
        tokio::spawn(async move { sampler.run(hub.as_ref(), cancel).await })
    };

    // step 6: websocket endpoint
    let app = server::router(ServerState { hub: Arc::clone(&hub), hal: Some(Arc::clone(&hal)) }, &config.server.path);
    println!("[STARTUP] ✓ Streaming on ws://{}{}", addr, config.server.path);
    let server = tokio::spawn(server::serve(listener, app, cancel.clone()));

    tokio::spawn(stop_on_signal(tokio::signal::ctrl_c(), cancel.clone()));

    // step 7: wait, then shut down in order
    cancel.cancelled().await;

    match sampler.await {
        Ok(Ok(stats)) => tracing::info!("[SHUTDOWN] Sampler stopped ({} ticks)", stats.ticks),
        Ok(Err(e)) => tracing::error!("[SHUTDOWN] Sampler failed: {}", e),
        Err(e) => tracing::error!("[SHUTDOWN] Sampler task panicked: {}", e),
    }

    hub.announce("Server shutdown").await;
    if let Err(e) = hub.shutdown(config.hub.shutdown_timeout()).await {
        tracing::warn!("[SHUTDOWN] {}", e);
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("[SHUTDOWN] Server error: {}", e),
        Err(e) => tracing::error!("[SHUTDOWN] Server task panicked: {}", e),
    }

    if config.fan.enabled {
        if let Err(e) = hal.set_fan(config.fan.gpio_pin, false) {
            tracing::error!("[SHUTDOWN] Fan could not be switched off: {}", e);
        }
    }

    println!("[SHUTDOWN] Done");
    Ok(())
}

/// cancel once the signal arrives; a listener that failed to install leaves the host running
async fn stop_on_signal(signal: impl Future<Output = std::io::Result<()>>, cancel: CancellationToken) {
    match signal.await {
        Ok(()) => {
            println!("\n[SHUTDOWN] Stopping...");
            cancel.cancel();
        }
        Err(e) => tracing::error!("[SHUTDOWN] Failed to listen for Ctrl+C: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels() {
        let cancel = CancellationToken::new();
        stop_on_signal(async { Ok(()) }, cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_failed_signal_listener_keeps_running() {
        let cancel = CancellationToken::new();
        let failed = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no signal driver")) };
        stop_on_signal(failed, cancel.clone()).await;
        assert!(!cancel.is_cancelled());
    }
}
