//! Live telemetry for the Marlin sensor rig.
//!
//! The host side samples the sensor bus on two cadences and broadcasts every
//! snapshot to connected viewers over a websocket. The viewer side keeps a
//! calibrated acceleration baseline and charts the deviation in a terminal.
//!
//! ```text
//! sensors ─► Sampler ─► Hub ─► /ws ════► Connector ─► ViewState ─► render
//! ```

pub mod config;
pub mod connector;
pub mod domain;
pub mod error;
pub mod hal;
pub mod hub;
pub mod logging;
pub mod sampler;
pub mod sensors;
pub mod server;
pub mod viewer;

pub use domain::{Acceleration, Axis, Channel, Snapshot};
pub use error::{Result, TelemetryError};
