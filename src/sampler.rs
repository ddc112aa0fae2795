//! ==============================================================================
//! sampler.rs - multi-rate sampling scheduler
//! ==============================================================================
//!
//! purpose:
//!     one logical loop at a fixed base period. every tick re-reads the fast
//!     sensor group; every Nth tick also reads the slow group. a tick that
//!     produced at least one value is handed to the sink exactly once, and the
//!     sink is awaited before the next tick starts.
//!
//! timing:
//!     the only throttle is the fixed delay between ticks. a tick takes as
//!     long as its sensor reads plus that delay, nothing more.
//!
//! ```text
//!     tick:    1    2    3    4    5    6    7    8
//!     fast:    x    x    x    x    x    x    x    x
//!     slow:                   x                   x      (slow_every = 4)
//! ```
//!
//! relationships:
//!     - uses: sensors (blocking reads, run on the blocking pool)
//!     - feeds: hub.rs (via SnapshotSink)
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::SamplerConfig;
use crate::domain::Snapshot;
use crate::error::Result;
use crate::sensors::SensorBank;

/// where finished snapshots go
pub trait SnapshotSink: Send + Sync {
    fn deliver(&self, snapshot: Snapshot) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub emitted: u64,
}

pub struct Sampler {
    bank: SensorBank,
    period: Duration,
    slow_every: u64,
    show_data: bool,
}

impl Sampler {
    pub fn new(bank: SensorBank, config: &SamplerConfig) -> Self {
        Self {
            bank,
            period: config.base_period(),
            slow_every: config.slow_every_ticks.max(1),
            show_data: false,
        }
    }

    /// log every slow-tick snapshot at info
    pub fn show_data(mut self, show: bool) -> Self {
        self.show_data = show;
        self
    }

    /// run until cancelled; returns how many ticks ran and how many emitted
    pub async fn run<S: SnapshotSink>(self, sink: &S, cancel: CancellationToken) -> Result<SamplerStats> {
        let Sampler { mut bank, period, slow_every, show_data } = self;
        let mut stats = SamplerStats::default();

        tracing::info!(
            "[SAMPLER] Starting ({}ms base tick, slow group every {} ticks, {} sensors)",
            period.as_millis(),
            slow_every,
            bank.len()
        );

        while !cancel.is_cancelled() {
            stats.ticks += 1;
            let include_slow = stats.ticks % slow_every == 0;

            // sensor reads block; hand the bank to the blocking pool and take it back
            let (returned, snapshot) = tokio::task::spawn_blocking(move || {
                let snapshot = bank.sample(include_slow);
                (bank, snapshot)
            })
            .await?;
            bank = returned;

            if cancel.is_cancelled() {
                break;
            }

            if !snapshot.is_empty() {
                if show_data && include_slow {
                    tracing::info!("[SAMPLER] {:?}", snapshot);
                }
                sink.deliver(snapshot).await;
                stats.emitted += 1;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }

        tracing::info!("[SAMPLER] Stopped after {} ticks ({} snapshots)", stats.ticks, stats.emitted);
        Ok(stats)
    }
}
