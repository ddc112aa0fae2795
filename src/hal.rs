//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for the two pieces of hardware the host
//!     touches: the I2C bus the sensors hang off, and the GPIO line that
//!     switches the enclosure fan.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal`) and a development machine (using mocks).
//!
//! design philosophy:
//!     - "Compile Anywhere": The host should compile on Windows/Mac/Linux.
//!     - "Zero Cost": On the Pi, this compiles down to direct `rppal` calls.
//!     - "Safety": The I2C bus is shared by every sensor driver, so it lives
//!       behind one lock and each transfer is atomic.
//!
//! relationships:
//!     - used by: sensors/* (register reads and writes)
//!     - used by: main.rs (fan side-channel)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use crate::error::Result;

pub trait HardwareProvider: Send + Sync {
    /// write `write_data` (if any) then read `read_len` bytes from device `addr`
    fn i2c_transfer(&self, addr: u8, write_data: &[u8], read_len: usize) -> Result<Vec<u8>>;
    fn write_gpio(&self, pin: u8, level: bool) -> Result<()>;
    fn set_fan(&self, pin: u8, on: bool) -> Result<()>;
    fn fan_state(&self) -> bool;

    fn i2c_write(&self, addr: u8, data: &[u8]) -> Result<()> {
        self.i2c_transfer(addr, data, 0).map(|_| ())
    }

    fn i2c_read(&self, addr: u8, len: usize) -> Result<Vec<u8>> {
        self.i2c_transfer(addr, &[], len)
    }

    /// read `len` bytes starting at register `reg`
    fn read_register(&self, addr: u8, reg: u8, len: usize) -> Result<Vec<u8>> {
        self.i2c_transfer(addr, &[reg], len)
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    fan: AtomicBool,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new() -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self { fan: AtomicBool::new(false) })
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn i2c_transfer(&self, addr: u8, write_data: &[u8], read_len: usize) -> Result<Vec<u8>> {
        tracing::trace!("[MOCK I2C] Addr: 0x{:02X}, Write: {:?}, ReadLen: {}", addr, write_data, read_len);
        Ok(vec![0u8; read_len])
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} write {}", pin, level);
        Ok(())
    }

    fn set_fan(&self, pin: u8, on: bool) -> Result<()> {
        tracing::debug!("[MOCK FAN] Pin {} set to {}", pin, if on { "ON" } else { "OFF" });
        self.fan.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn fan_state(&self) -> bool {
        self.fan.load(Ordering::SeqCst)
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    i2c: std::sync::Mutex<rppal::i2c::I2c>,
    fan: AtomicBool,
}

#[cfg(feature = "hardware")]
fn bus_error(e: impl std::fmt::Display) -> crate::error::TelemetryError {
    crate::error::TelemetryError::Bus(e.to_string())
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new() -> Result<Self> {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        let i2c = rppal::i2c::I2c::new().map_err(bus_error)?;
        Ok(Self { i2c: std::sync::Mutex::new(i2c), fan: AtomicBool::new(false) })
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn i2c_transfer(&self, addr: u8, write_data: &[u8], read_len: usize) -> Result<Vec<u8>> {
        let mut i2c = self.i2c.lock().map_err(|_| bus_error("i2c lock poisoned"))?;
        i2c.set_slave_address(addr as u16).map_err(bus_error)?;

        if !write_data.is_empty() {
            i2c.write(write_data).map_err(bus_error)?;
        }

        if read_len > 0 {
            let mut read_buf = vec![0u8; read_len];
            i2c.read(&mut read_buf).map_err(bus_error)?;
            Ok(read_buf)
        } else {
            Ok(vec![])
        }
    }

    fn write_gpio(&self, pin: u8, level: bool) -> Result<()> {
        use rppal::gpio::Gpio;
        let gpio = Gpio::new().map_err(bus_error)?;
        let mut p = gpio.get(pin).map_err(bus_error)?.into_output();
        // CRITICAL: Prevent GPIO from resetting when dropped
        // Without this, the fan turns off as soon as this function returns
        p.set_reset_on_drop(false);
        if level { p.set_high(); } else { p.set_low(); }
        Ok(())
    }

    fn set_fan(&self, pin: u8, on: bool) -> Result<()> {
        // fan driver input is active high
        self.write_gpio(pin, on)?;
        self.fan.store(on, Ordering::SeqCst);
        Ok(())
    }

    fn fan_state(&self) -> bool {
        self.fan.load(Ordering::SeqCst)
    }
}
