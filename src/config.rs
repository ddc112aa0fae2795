//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml` and `viewer.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - HostConfig: server endpoint, sampler cadence, sensor addresses,
//!       fan side-channel, hub send and shutdown bounds, logging.
//!     - ViewerConfig: server to connect to, loop timings, chart geometry,
//!       logging (optionally to a file so the terminal chart stays clean).
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// well-known port of the telemetry endpoint
pub const DEFAULT_PORT: u16 = 5000;
/// well-known path of the telemetry endpoint
pub const DEFAULT_PATH: &str = "/ws";

// ==============================================================================
// host
// ==============================================================================

/// Root configuration structure of the sampling host
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub sampler: SamplerConfig,
    pub sensors: SensorsConfig,
    pub fan: FanConfig,
    pub hub: HubConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplerConfig {
    /// fixed delay between ticks
    pub base_period_ms: u64,
    /// slow sensor group runs on every Nth tick
    pub slow_every_ticks: u64,
    /// settle time after switching the ADC multiplexer
    pub adc_settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorsConfig {
    /// use the simulated bank even on hardware builds
    pub simulate: bool,
    pub imu_address: u8,
    pub climate_address: u8,
    pub air_quality_address: u8,
    pub adc_address: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FanConfig {
    pub enabled: bool,
    pub gpio_pin: u8,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HubConfig {
    /// a viewer whose send takes longer than this is dropped
    pub send_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
    /// viewer only: write logs here instead of the terminal
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { base_period_ms: 10, slow_every_ticks: 100, adc_settle_ms: 10 }
    }
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            imu_address: 0x68,
            climate_address: 0x38,
            air_quality_address: 0x52,
            adc_address: 0x48,
        }
    }
}

impl Default for FanConfig {
    fn default() -> Self {
        Self { enabled: true, gpio_pin: 16 }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { send_timeout_ms: 1000, shutdown_timeout_ms: 2000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: false, file: None }
    }
}

impl SamplerConfig {
    pub fn base_period(&self) -> Duration {
        Duration::from_millis(self.base_period_ms)
    }

    pub fn adc_settle(&self) -> Duration {
        Duration::from_millis(self.adc_settle_ms)
    }
}

impl HubConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        load_toml(path.as_ref())
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        search_or_default("host.toml")
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Endpoint: ws://{}:{}{}", self.server.bind, self.server.port, self.server.path);
        println!("│ Base Tick: {}ms", self.sampler.base_period_ms);
        println!("│ Slow Group: every {} ticks", self.sampler.slow_every_ticks);
        println!("│ ADC Settle: {}ms", self.sampler.adc_settle_ms);
        println!("│ Fan: {} (GPIO{})", if self.fan.enabled { "on" } else { "off" }, self.fan.gpio_pin);
        println!("│ Send Timeout: {}ms", self.hub.send_timeout_ms);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}

// ==============================================================================
// viewer
// ==============================================================================

/// Root configuration structure of the terminal viewer
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ViewerConfig {
    pub server: RemoteConfig,
    pub timing: TimingConfig,
    pub chart: ChartConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub frame_ms: u64,
    /// liveness poll of the connector
    pub poll_ms: u64,
    /// backoff after a failed connect
    pub retry_ms: u64,
    pub calibration_ms: u64,
    pub disconnect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub capacity: usize,
    pub height: usize,
    /// columns reserved around the plot
    pub margin: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server: RemoteConfig::default(),
            timing: TimingConfig::default(),
            chart: ChartConfig::default(),
            logging: LoggingConfig { level: "error".to_string(), ..LoggingConfig::default() },
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            frame_ms: 50,
            poll_ms: 100,
            retry_ms: 2000,
            calibration_ms: 1000,
            disconnect_timeout_ms: 2000,
        }
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self { capacity: 80, height: 15, margin: 4 }
    }
}

impl RemoteConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.path)
    }
}

impl TimingConfig {
    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    pub fn calibration(&self) -> Duration {
        Duration::from_millis(self.calibration_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }
}

impl ViewerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        load_toml(path.as_ref())
    }

    pub fn load_or_default() -> Self {
        search_or_default("viewer.toml")
    }
}

// ==============================================================================
// shared loading
// ==============================================================================

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

fn search_or_default<T: serde::de::DeserializeOwned + Default>(file_name: &str) -> T {
    let paths = [
        PathBuf::from("config").join(file_name),
        PathBuf::from("..").join("config").join(file_name),
    ];

    for path in &paths {
        if path.exists() {
            match load_toml(path) {
                Ok(config) => {
                    println!("[CONFIG] Loaded from {}", path.display());
                    return config;
                }
                Err(e) => {
                    println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                }
            }
        }
    }

    println!("[CONFIG] Warning: No {} found - using defaults", file_name);
    T::default()
}
