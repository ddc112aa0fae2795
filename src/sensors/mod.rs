//! ==============================================================================
//! sensors - device drivers and the cadence-grouped sensor bank
//! ==============================================================================
//!
//! purpose:
//!     every physical device is reduced to one blocking `read()` that yields
//!     whichever channels it managed to measure. the bank groups devices into
//!     a fast group (read every tick) and a slow group (read every Nth tick)
//!     and folds one tick's reads into a fresh Snapshot.
//!
//! failure model:
//!     - open() failing at startup -> the device is left out of the bank for
//!       good, logged once
//!     - read() failing -> only that device's channels are absent this tick
//!
//! relationships:
//!     - uses: hal.rs (I2C transfers)
//!     - used by: sampler.rs (sample one tick), main.rs (probe at startup)
//!
//! ==============================================================================

mod ads1115;
mod aht10;
mod bmi270;
mod ens160;
pub mod sim;

pub use ads1115::Ads1115;
pub use aht10::Aht10;
pub use bmi270::Bmi270;
pub use ens160::Ens160;

use std::sync::Arc;
use std::time::Duration;

use crate::config::SensorsConfig;
use crate::domain::{Channel, Snapshot};
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;

/// channels one read produced; absent channels are simply not listed
pub type Readings = Vec<(Channel, f64)>;

pub trait Sensor: Send {
    fn name(&self) -> &'static str;

    /// one blocking read of the device
    fn read(&mut self) -> Result<Readings>;
}

/// how often the sampler visits a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cadence {
    EveryTick,
    Slow,
}

#[derive(Default)]
pub struct SensorBank {
    fast: Vec<Box<dyn Sensor>>,
    slow: Vec<Box<dyn Sensor>>,
}

impl SensorBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cadence: Cadence, sensor: Box<dyn Sensor>) {
        match cadence {
            Cadence::EveryTick => self.fast.push(sensor),
            Cadence::Slow => self.slow.push(sensor),
        }
    }

    /// keep the sensor if it opened, otherwise log it as unavailable for good
    pub fn add_opened<S: Sensor + 'static>(&mut self, cadence: Cadence, opened: Result<S>) {
        match opened {
            Ok(sensor) => {
                tracing::info!("[SENSORS] ✓ {} found", sensor.name());
                self.add(cadence, Box::new(sensor));
            }
            Err(e) => tracing::error!("[SENSORS] {}", e),
        }
    }

    /// open every configured device on the bus
    pub fn probe(hal: Arc<dyn HardwareProvider>, config: &SensorsConfig, adc_settle: Duration) -> Self {
        let mut bank = Self::new();
        bank.add_opened(Cadence::EveryTick, Bmi270::open(hal.clone(), config.imu_address));
        bank.add_opened(Cadence::Slow, Aht10::open(hal.clone(), config.climate_address));
        bank.add_opened(Cadence::Slow, Ens160::open(hal.clone(), config.air_quality_address));
        bank.add_opened(Cadence::Slow, Ads1115::open(hal, config.adc_address, adc_settle));

        if bank.is_empty() {
            tracing::warn!("[SENSORS] No sensors available - host will publish nothing");
        }
        bank
    }

    /// workstation stand-ins with the same cadence split as the real devices
    pub fn simulated(adc_settle: Duration) -> Self {
        let mut bank = Self::new();
        bank.add(Cadence::EveryTick, Box::new(sim::SimulatedImu::new()));
        bank.add(Cadence::Slow, Box::new(sim::SimulatedClimate::new()));
        bank.add(Cadence::Slow, Box::new(sim::SimulatedAirQuality::new()));
        bank.add(Cadence::Slow, Box::new(sim::SimulatedAdc::new(adc_settle)));
        bank
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty() && self.slow.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fast.len() + self.slow.len()
    }

    /// read the fast group, plus the slow group when asked, into a fresh snapshot
    pub fn sample(&mut self, include_slow: bool) -> Snapshot {
        let mut snapshot = Snapshot::default();

        read_group(&mut self.fast, &mut snapshot);
        if include_slow {
            read_group(&mut self.slow, &mut snapshot);
        }

        snapshot
    }
}

fn read_group(group: &mut [Box<dyn Sensor>], snapshot: &mut Snapshot) {
    for sensor in group.iter_mut() {
        match sensor.read() {
            Ok(readings) => {
                for (channel, value) in readings {
                    snapshot.set(channel, value);
                }
            }
            Err(e) => tracing::trace!("[SENSORS] {}", e),
        }
    }
}

fn read_u16_be(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

fn read_u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn expect_len(sensor: &'static str, bytes: &[u8], len: usize) -> Result<()> {
    if bytes.len() < len {
        return Err(TelemetryError::read_failed(
            sensor,
            format!("short read ({} of {} bytes)", bytes.len(), len),
        ));
    }
    Ok(())
}
