//! BMI270 IMU - accelerometer only, ±2 g, 100 Hz output data rate.

use std::sync::Arc;

use super::{expect_len, Readings, Sensor};
use crate::domain::Channel;
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;

const NAME: &str = "BMI270";

const REG_CHIP_ID: u8 = 0x00;
const REG_ACC_DATA: u8 = 0x0C;
const REG_ACC_CONF: u8 = 0x40;
const REG_ACC_RANGE: u8 = 0x41;
const REG_PWR_CONF: u8 = 0x7C;
const REG_PWR_CTRL: u8 = 0x7D;

const CHIP_ID: u8 = 0x24;
/// LSB per g at the ±2 g range
const LSB_PER_G: f64 = 16384.0;

pub struct Bmi270 {
    hal: Arc<dyn HardwareProvider>,
    addr: u8,
}

impl Bmi270 {
    pub fn open(hal: Arc<dyn HardwareProvider>, addr: u8) -> Result<Self> {
        let unavailable = |e: TelemetryError| TelemetryError::unavailable(NAME, e);

        let id = hal.read_register(addr, REG_CHIP_ID, 1).map_err(unavailable)?;
        if id.first() != Some(&CHIP_ID) {
            return Err(TelemetryError::unavailable(NAME, format!("unexpected chip id {:?} at 0x{:02X}", id, addr)));
        }

        // advanced power save off, 100 Hz normal mode, ±2 g, accelerometer on
        for command in [[REG_PWR_CONF, 0x00], [REG_ACC_CONF, 0xA8], [REG_ACC_RANGE, 0x00], [REG_PWR_CTRL, 0x04]] {
            hal.i2c_write(addr, &command).map_err(unavailable)?;
        }

        Ok(Self { hal, addr })
    }
}

impl Sensor for Bmi270 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&mut self) -> Result<Readings> {
        let raw = self
            .hal
            .read_register(self.addr, REG_ACC_DATA, 6)
            .map_err(|e| TelemetryError::read_failed(NAME, e))?;
        expect_len(NAME, &raw, 6)?;

        let axis = |at: usize| i16::from_le_bytes([raw[at], raw[at + 1]]) as f64 / LSB_PER_G;
        Ok(vec![
            (Channel::AccelerationX, axis(0)),
            (Channel::AccelerationY, axis(2)),
            (Channel::AccelerationZ, axis(4)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::testing::ScriptedBus;

    #[test]
    fn test_open_configures_accelerometer() {
        let bus = ScriptedBus::new();
        bus.respond(0x68, &[CHIP_ID]);

        assert!(Bmi270::open(bus.clone(), 0x68).is_ok());
        let writes = bus.writes_to(0x68);
        assert_eq!(writes.first(), Some(&vec![REG_CHIP_ID]));
        assert_eq!(writes.last(), Some(&vec![REG_PWR_CTRL, 0x04]));
    }

    #[test]
    fn test_wrong_chip_is_unavailable() {
        let bus = ScriptedBus::new();
        bus.respond(0x68, &[0x90]);
        assert!(matches!(
            Bmi270::open(bus, 0x68),
            Err(TelemetryError::SensorUnavailable { .. })
        ));
    }

    #[test]
    fn test_read_converts_to_g() {
        let bus = ScriptedBus::new();
        bus.respond(0x68, &[CHIP_ID]);
        let mut imu = Bmi270::open(bus.clone(), 0x68).unwrap();

        // x = +0.5 g, y = -0.25 g, z = +1 g
        bus.respond(0x68, &[0x00, 0x20, 0x00, 0xF0, 0x00, 0x40]);
        let readings = imu.read().unwrap();
        assert_eq!(
            readings,
            vec![
                (Channel::AccelerationX, 0.5),
                (Channel::AccelerationY, -0.25),
                (Channel::AccelerationZ, 1.0),
            ]
        );
    }

    #[test]
    fn test_short_read_fails() {
        let bus = ScriptedBus::new();
        bus.respond(0x68, &[CHIP_ID]);
        let mut imu = Bmi270::open(bus.clone(), 0x68).unwrap();

        bus.respond(0x68, &[0x00, 0x20]);
        assert!(imu.read().is_err());
    }
}
