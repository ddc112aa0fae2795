//! ENS160 air quality sensor (TVOC, eCO2), standard operating mode.

use std::sync::Arc;

use super::{expect_len, read_u16_le, Readings, Sensor};
use crate::domain::Channel;
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;

const NAME: &str = "ENS160";

const REG_PART_ID: u8 = 0x00;
const REG_OPMODE: u8 = 0x10;
const REG_DATA_STATUS: u8 = 0x20;
const REG_DATA_TVOC: u8 = 0x22;

const PART_ID: u16 = 0x0160;
const OPMODE_STANDARD: u8 = 0x02;
const VALIDITY_INVALID: u8 = 0x03;

pub struct Ens160 {
    hal: Arc<dyn HardwareProvider>,
    addr: u8,
}

impl Ens160 {
    pub fn open(hal: Arc<dyn HardwareProvider>, addr: u8) -> Result<Self> {
        let unavailable = |e: TelemetryError| TelemetryError::unavailable(NAME, e);

        let id = hal.read_register(addr, REG_PART_ID, 2).map_err(unavailable)?;
        expect_len(NAME, &id, 2).map_err(unavailable)?;
        if read_u16_le(&id, 0) != PART_ID {
            return Err(TelemetryError::unavailable(NAME, format!("unexpected part id at 0x{:02X}", addr)));
        }

        hal.i2c_write(addr, &[REG_OPMODE, OPMODE_STANDARD]).map_err(unavailable)?;
        Ok(Self { hal, addr })
    }
}

impl Sensor for Ens160 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&mut self) -> Result<Readings> {
        let failed = |e: TelemetryError| TelemetryError::read_failed(NAME, e);

        let status = self.hal.read_register(self.addr, REG_DATA_STATUS, 1).map_err(failed)?;
        expect_len(NAME, &status, 1)?;
        if (status[0] >> 2) & 0x03 == VALIDITY_INVALID {
            return Err(TelemetryError::read_failed(NAME, "invalid output"));
        }

        let data = self.hal.read_register(self.addr, REG_DATA_TVOC, 4).map_err(failed)?;
        expect_len(NAME, &data, 4)?;

        let tvoc_ppb = read_u16_le(&data, 0) as f64;
        let eco2_ppm = read_u16_le(&data, 2) as f64;
        Ok(vec![(Channel::Tvoc, tvoc_ppb / 1000.0), (Channel::Co2, eco2_ppm)])
    }
}
