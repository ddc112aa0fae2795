//! ADS1115 4-channel ADC in single-shot mode.
//!
//! Every channel switch restarts the conversion, so each channel is written,
//! given the settle time, then read, one after another within the same tick.

use std::sync::Arc;
use std::time::Duration;

use super::{expect_len, read_u16_be, Readings, Sensor};
use crate::domain::Channel;
use crate::error::{Result, TelemetryError};
use crate::hal::HardwareProvider;

const NAME: &str = "ADS1115";

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_START: u16 = 0x8000;
const MUX_SINGLE_ENDED: u16 = 0b100;
/// ±6.144 V full scale, suits 5 V signals
const PGA_6_144V: u16 = 0b000 << 9;
const MODE_SINGLE_SHOT: u16 = 0x0100;
const DR_128_SPS: u16 = 0b100 << 5;
const COMPARATOR_OFF: u16 = 0x0003;

const FULL_SCALE_VOLTS: f64 = 6.144;

pub struct Ads1115 {
    hal: Arc<dyn HardwareProvider>,
    addr: u8,
    settle: Duration,
}

impl Ads1115 {
    pub fn open(hal: Arc<dyn HardwareProvider>, addr: u8, settle: Duration) -> Result<Self> {
        let config = hal
            .read_register(addr, REG_CONFIG, 2)
            .map_err(|e| TelemetryError::unavailable(NAME, e))?;
        expect_len(NAME, &config, 2).map_err(|e| TelemetryError::unavailable(NAME, e))?;
        Ok(Self { hal, addr, settle })
    }

    fn config_word(input: u16) -> u16 {
        OS_START
            | ((MUX_SINGLE_ENDED | input) << 12)
            | PGA_6_144V
            | MODE_SINGLE_SHOT
            | DR_128_SPS
            | COMPARATOR_OFF
    }

    fn read_input(&self, input: u16) -> Result<f64> {
        let [hi, lo] = Self::config_word(input).to_be_bytes();
        self.hal.i2c_write(self.addr, &[REG_CONFIG, hi, lo])?;
        std::thread::sleep(self.settle);

        let raw = self.hal.read_register(self.addr, REG_CONVERSION, 2)?;
        expect_len(NAME, &raw, 2)?;
        let counts = read_u16_be(&raw, 0) as i16;
        Ok(counts as f64 * FULL_SCALE_VOLTS / 32768.0)
    }
}

impl Sensor for Ads1115 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn read(&mut self) -> Result<Readings> {
        let mut readings = Vec::with_capacity(Channel::ADC.len());
        let mut last_error = None;

        for (input, channel) in Channel::ADC.iter().enumerate() {
            match self.read_input(input as u16) {
                Ok(volts) => readings.push((*channel, volts)),
                Err(e) => {
                    tracing::trace!("[SENSORS] {} A{} failed: {}", NAME, input, e);
                    last_error = Some(e);
                }
            }
        }

        match (readings.is_empty(), last_error) {
            (true, Some(e)) => Err(TelemetryError::read_failed(NAME, e)),
            _ => Ok(readings),
        }
    }
}
