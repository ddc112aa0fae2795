//! Simulated devices for workstation builds.
//!
//! Slow, smooth waveforms around plausible room values, so the viewer has
//! something to chart when no Pi is attached.

use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use super::{Readings, Sensor};
use crate::domain::Channel;
use crate::error::Result;

fn wave(started: Instant, hz: f64) -> f64 {
    (started.elapsed().as_secs_f64() * TAU * hz).sin()
}

pub struct SimulatedImu {
    started: Instant,
}

impl SimulatedImu {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Sensor for SimulatedImu {
    fn name(&self) -> &'static str {
        "SIM-IMU"
    }

    fn read(&mut self) -> Result<Readings> {
        Ok(vec![
            (Channel::AccelerationX, 0.02 * wave(self.started, 0.5)),
            (Channel::AccelerationY, -0.01 * wave(self.started, 0.2)),
            (Channel::AccelerationZ, 1.0 + 0.05 * wave(self.started, 1.3)),
        ])
    }
}

pub struct SimulatedClimate {
    started: Instant,
}

impl SimulatedClimate {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Sensor for SimulatedClimate {
    fn name(&self) -> &'static str {
        "SIM-CLIMATE"
    }

    fn read(&mut self) -> Result<Readings> {
        Ok(vec![
            (Channel::Temperature, 22.0 + 0.5 * wave(self.started, 1.0 / 60.0)),
            (Channel::Humidity, 45.0 + 2.0 * wave(self.started, 1.0 / 90.0)),
        ])
    }
}

pub struct SimulatedAirQuality {
    started: Instant,
}

impl SimulatedAirQuality {
    pub fn new() -> Self {
        Self { started: Instant::now() }
    }
}

impl Sensor for SimulatedAirQuality {
    fn name(&self) -> &'static str {
        "SIM-AIR"
    }

    fn read(&mut self) -> Result<Readings> {
        Ok(vec![
            (Channel::Tvoc, 0.12 + 0.02 * wave(self.started, 1.0 / 45.0)),
            (Channel::Co2, 420.0 + 15.0 * wave(self.started, 1.0 / 120.0)),
        ])
    }
}

pub struct SimulatedAdc {
    started: Instant,
    settle: Duration,
}

impl SimulatedAdc {
    pub fn new(settle: Duration) -> Self {
        Self { started: Instant::now(), settle }
    }
}

impl Sensor for SimulatedAdc {
    fn name(&self) -> &'static str {
        "SIM-ADC"
    }

    fn read(&mut self) -> Result<Readings> {
        let mut readings = Vec::with_capacity(Channel::ADC.len());
        for (i, channel) in Channel::ADC.iter().enumerate() {
            // same per-channel settle the real converter needs
            std::thread::sleep(self.settle);
            let volts = 0.5 * (i + 1) as f64 + 0.05 * wave(self.started, 0.1 * (i + 1) as f64);
            readings.push((*channel, volts));
        }
        Ok(readings)
    }
}
