//! ==============================================================================
//! error.rs - telemetry error taxonomy
//! ==============================================================================
//!
//! purpose:
//!     one typed error for everything the library can fail at. binaries and
//!     config loading stay on anyhow; the sampler, hub and connector return
//!     these so callers can tell a dead sensor from a dropped viewer.
//!
//! ==============================================================================

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// sensor failed to open at startup; treated as absent for the process lifetime
    #[error("sensor {sensor} unavailable: {reason}")]
    SensorUnavailable { sensor: &'static str, reason: String },

    /// a single read failed; only that field for that tick is affected
    #[error("{sensor} read failed: {reason}")]
    ReadFailed { sensor: &'static str, reason: String },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("i2c/gpio bus error: {0}")]
    Bus(String),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sampler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TelemetryError {
    pub fn read_failed(sensor: &'static str, reason: impl ToString) -> Self {
        Self::ReadFailed { sensor, reason: reason.to_string() }
    }

    pub fn unavailable(sensor: &'static str, reason: impl ToString) -> Self {
        Self::SensorUnavailable { sensor, reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
