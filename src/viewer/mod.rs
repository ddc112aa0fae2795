//! ==============================================================================
//! viewer - live terminal dashboard
//! ==============================================================================
//!
//! purpose:
//!     connects to a host, calibrates an acceleration baseline, then charts
//!     the deviation of one axis while latching the other instruments.
//!
//! tasks (all stop on one CancellationToken):
//!
//! ```text
//!     connector receive loop ──► ViewState ◄── key reader (blocking pool)
//!                                    │
//!                           render loop (fixed frame)
//!
//!     supervisor: polls the connector and reconnects after a loss
//! ```
//!
//! ==============================================================================

pub mod input;
pub mod render;
pub mod state;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{ChartConfig, TimingConfig, ViewerConfig};
use crate::connector::Connector;
use crate::domain::Snapshot;

use render::LinkStatus;
use state::{lock, SharedState, ViewState};

/// raw mode + alternate screen for as long as it lives
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen, Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e).context("Failed to enter alternate screen");
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// run the viewer until `cancel` fires or the user quits
pub async fn run(config: ViewerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let state = ViewState::shared(config.chart.capacity);
    let connector = Arc::new(Connector::new(config.server.url(), {
        let state = Arc::clone(&state);
        move |snapshot: Snapshot| lock(&state).ingest(&snapshot)
    }));

    println!("Connecting to {}...", connector.url());
    if !connect_with_retry(&connector, &config.timing, &cancel).await {
        return Ok(());
    }
    println!("Connected!");

    println!("Collecting baseline for {}ms...", config.timing.calibration_ms);
    tokio::select! {
        _ = cancel.cancelled() => {
            close(&connector, &config.timing).await;
            return Ok(());
        }
        _ = tokio::time::sleep(config.timing.calibration()) => {}
    }

    let (reference, collected) = {
        let mut state = lock(&state);
        let collected = state.baseline().collected();
        (state.calibrate(), collected)
    };
    if collected == 0 {
        println!("No baseline data received. Using zero baseline.");
    } else {
        println!(
            "Baseline from {} samples: X={:.3}g Y={:.3}g Z={:.3}g",
            collected, reference.x, reference.y, reference.z
        );
    }
    tracing::info!("[VIEWER] Baseline {:?} from {} samples", reference, collected);

    let guard = TerminalGuard::enter()?;

    let renderer = tokio::spawn(render_loop(
        Arc::clone(&state),
        Arc::clone(&connector),
        config.timing.clone(),
        config.chart.clone(),
        cancel.clone(),
    ));
    let keys = tokio::task::spawn_blocking({
        let state = Arc::clone(&state);
        let cancel = cancel.clone();
        let tick = config.timing.poll();
        move || input::read_keys(state, cancel, tick)
    });

    supervise(&connector, &config.timing, &cancel).await;

    let _ = renderer.await;
    let _ = keys.await;
    drop(guard);

    close(&connector, &config.timing).await;
    println!("Disconnected.");
    Ok(())
}

/// keep trying until connected; false when cancelled first
async fn connect_with_retry(connector: &Connector, timing: &TimingConfig, cancel: &CancellationToken) -> bool {
    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return false,
            attempt = connector.connect() => attempt,
        };
        match attempt {
            Ok(()) => return true,
            Err(e) => {
                eprintln!(
                    "Cannot reach {}: {}. Retrying in {:.1}s...",
                    connector.url(),
                    e,
                    timing.retry().as_secs_f64()
                );
                tracing::warn!("[VIEWER] Connect failed: {}", e);
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(timing.retry()) => {}
        }
    }
}

/// poll the link and reconnect on loss until cancelled
pub async fn supervise(connector: &Connector, timing: &TimingConfig, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(timing.poll()) => {}
        }
        if connector.is_connected() {
            continue;
        }

        tracing::warn!("[VIEWER] Connection lost, reconnecting to {}", connector.url());
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = connector.connect() => attempt,
        };
        if let Err(e) = attempt {
            tracing::warn!("[VIEWER] Reconnect failed: {}", e);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(timing.retry()) => {}
            }
        }
    }
}

async fn render_loop(
    state: SharedState,
    connector: Arc<Connector>,
    timing: TimingConfig,
    chart: ChartConfig,
    cancel: CancellationToken,
) {
    let mut frames = tokio::time::interval(timing.frame());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = frames.tick() => {}
        }

        let width = terminal::size().map(|(w, _)| w as usize).unwrap_or(80);
        let link = if connector.is_connected() { LinkStatus::Connected } else { LinkStatus::Reconnecting };
        let lines = render::render_frame(&lock(&state), link, width, &chart);

        if let Err(e) = render::paint(&mut stdout, &lines) {
            tracing::error!("[VIEWER] Paint failed: {}", e);
            cancel.cancel();
            break;
        }
    }

    let _ = stdout.flush();
}

async fn close(connector: &Connector, timing: &TimingConfig) {
    if let Err(e) = connector.disconnect(timing.disconnect_timeout()).await {
        tracing::warn!("[VIEWER] Disconnect: {}", e);
    }
}
