//! AHT10 temperature / humidity sensor.

use std::sync::Arc;
use std::time::Duration;

use super::{expect_len, Readings, Sensor};
use crate::domain::Channel;
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;

const NAME: &str = "AHT10";

const CMD_CALIBRATE: [u8; 3] = [0xE1, 0x08, 0x00];
const CMD_MEASURE: [u8; 3] = [0xAC, 0x33, 0x00];
const STATUS_BUSY: u8 = 0x80;
const FULL_SCALE: f64 = (1u32 << 20) as f64;

/// datasheet conversion time after a measure command
pub const CONVERSION_TIME: Duration = Duration::from_millis(80);

pub struct Aht10 {
    hal: Arc<dyn HardwareProvider>,
    addr: u8,
    conversion: Duration,
}

impl Aht10 {
    pub fn open(hal: Arc<dyn HardwareProvider>, addr: u8) -> Result<Self> {
        Self::open_with(hal, addr, CONVERSION_TIME)
    }

    /// open with a custom conversion wait. the initial measurement proves the
    /// device is actually on the bus
    pub fn open_with(hal: Arc<dyn HardwareProvider>, addr: u8, conversion: Duration) -> Result<Self> {
        hal.i2c_write(addr, &CMD_CALIBRATE)
            .map_err(|e| TelemetryError::unavailable(NAME, e))?;

        let mut sensor = Self { hal, addr, conversion };
        sensor.read().map_err(|e| TelemetryError::unavailable(NAME, e))?;
        Ok(sensor)
    }
}

impl Sensor for Aht10 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&mut self) -> Result<Readings> {
        let failed = |e: TelemetryError| TelemetryError::read_failed(NAME, e);

        self.hal.i2c_write(self.addr, &CMD_MEASURE).map_err(failed)?;
        std::thread::sleep(self.conversion);
        let raw = self.hal.i2c_read(self.addr, 6).map_err(failed)?;
        expect_len(NAME, &raw, 6)?;

        if raw[0] & STATUS_BUSY != 0 {
            return Err(TelemetryError::read_failed(NAME, "still measuring"));
        }

        let humidity = ((raw[1] as u32) << 12) | ((raw[2] as u32) << 4) | ((raw[3] as u32) >> 4);
        let temperature = (((raw[3] as u32) & 0x0F) << 16) | ((raw[4] as u32) << 8) | raw[5] as u32;

        Ok(vec![
            (Channel::Temperature, temperature as f64 / FULL_SCALE * 200.0 - 50.0),
            (Channel::Humidity, humidity as f64 / FULL_SCALE * 100.0),
        ])
    }
}
