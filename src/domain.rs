use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};

/// one named scalar reading source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    Temperature,
    Humidity,
    Tvoc,
    Co2,
    Adc0,
    Adc1,
    Adc2,
    Adc3,
}

impl Channel {
    pub const ALL: [Channel; 11] = [
        Channel::AccelerationX,
        Channel::AccelerationY,
        Channel::AccelerationZ,
        Channel::Temperature,
        Channel::Humidity,
        Channel::Tvoc,
        Channel::Co2,
        Channel::Adc0,
        Channel::Adc1,
        Channel::Adc2,
        Channel::Adc3,
    ];

    pub const ADC: [Channel; 4] = [Channel::Adc0, Channel::Adc1, Channel::Adc2, Channel::Adc3];

    /// canonical name used on the wire
    pub fn wire_name(self) -> &'static str {
        match self {
            Channel::AccelerationX => "accelerationX",
            Channel::AccelerationY => "accelerationY",
            Channel::AccelerationZ => "accelerationZ",
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Tvoc => "tvoc",
            Channel::Co2 => "co2",
            Channel::Adc0 => "adc0",
            Channel::Adc1 => "adc1",
            Channel::Adc2 => "adc2",
            Channel::Adc3 => "adc3",
        }
    }

    /// case-insensitive lookup, including the older `adcNValue` / `adc` spellings
    pub fn from_name(name: &str) -> Option<Channel> {
        let lower = name.to_ascii_lowercase();
        let channel = match lower.as_str() {
            "adc" | "adcvalue" | "adc0value" => Channel::Adc0,
            "adc1value" => Channel::Adc1,
            "adc2value" => Channel::Adc2,
            "adc3value" => Channel::Adc3,
            other => *Channel::ALL
                .iter()
                .find(|c| c.wire_name().eq_ignore_ascii_case(other))?,
        };
        Some(channel)
    }

    /// the three chart channels; everything else is a latched instrument
    pub fn is_acceleration(self) -> bool {
        matches!(self, Channel::AccelerationX | Channel::AccelerationY | Channel::AccelerationZ)
    }
}

/// one set of optional readings produced by a single sampler tick
///
/// every field is independently present or absent. absent fields are left
/// out of the wire form entirely.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceleration_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvoc: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc0: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc3: Option<f64>,
}

impl Snapshot {
    fn slot(&mut self, channel: Channel) -> &mut Option<f64> {
        match channel {
            Channel::AccelerationX => &mut self.acceleration_x,
            Channel::AccelerationY => &mut self.acceleration_y,
            Channel::AccelerationZ => &mut self.acceleration_z,
            Channel::Temperature => &mut self.temperature,
            Channel::Humidity => &mut self.humidity,
            Channel::Tvoc => &mut self.tvoc,
            Channel::Co2 => &mut self.co2,
            Channel::Adc0 => &mut self.adc0,
            Channel::Adc1 => &mut self.adc1,
            Channel::Adc2 => &mut self.adc2,
            Channel::Adc3 => &mut self.adc3,
        }
    }

    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::AccelerationX => self.acceleration_x,
            Channel::AccelerationY => self.acceleration_y,
            Channel::AccelerationZ => self.acceleration_z,
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Tvoc => self.tvoc,
            Channel::Co2 => self.co2,
            Channel::Adc0 => self.adc0,
            Channel::Adc1 => self.adc1,
            Channel::Adc2 => self.adc2,
            Channel::Adc3 => self.adc3,
        }
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        *self.slot(channel) = Some(value);
    }

    /// true when no channel carries a value - such a snapshot is never an observation
    pub fn is_empty(&self) -> bool {
        Channel::ALL.iter().all(|c| self.get(*c).is_none())
    }

    pub fn present(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL
            .iter()
            .filter_map(move |c| self.get(*c).map(|v| (*c, v)))
    }

    /// all three acceleration components, or nothing
    pub fn acceleration(&self) -> Option<Acceleration> {
        Some(Acceleration {
            x: self.acceleration_x?,
            y: self.acceleration_y?,
            z: self.acceleration_z?,
        })
    }

    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// parse one inbound text frame
    ///
    /// field names match case-insensitively and unknown fields are ignored.
    /// non-objects, known fields carrying non-numeric values and payloads with
    /// no known field present (control messages share the channel) are
    /// `Malformed`.
    pub fn parse(text: &str) -> Result<Snapshot> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let object = value
            .as_object()
            .ok_or_else(|| TelemetryError::Malformed("not a json object".into()))?;

        let mut snapshot = Snapshot::default();
        for (name, value) in object {
            let Some(channel) = Channel::from_name(name) else {
                continue;
            };
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::Number(n) => {
                    let v = n
                        .as_f64()
                        .ok_or_else(|| TelemetryError::Malformed(format!("{} out of range", name)))?;
                    snapshot.set(channel, v);
                }
                other => return Err(TelemetryError::Malformed(format!("{} is not a number: {}", name, other))),
            }
        }

        if snapshot.is_empty() {
            return Err(TelemetryError::Malformed("no readings present".into()));
        }
        Ok(snapshot)
    }
}

/// chart axis of the accelerometer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    #[default]
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn next(self) -> Axis {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::Z,
            Axis::Z => Axis::X,
        }
    }

    pub fn previous(self) -> Axis {
        match self {
            Axis::X => Axis::Z,
            Axis::Y => Axis::X,
            Axis::Z => Axis::Y,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// non-snapshot payload sharing the viewer channel
#[derive(Clone, Debug, Serialize)]
pub struct ControlMessage {
    pub message: String,
    pub timestamp: u64,
}

impl ControlMessage {
    pub fn now(message: impl Into<String>) -> Self {
        Self { message: message.into(), timestamp: timestamp_ms() }
    }
}

/// current timestamp in milliseconds (unix epoch)
pub fn timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_omitted() {
        let mut s = Snapshot::default();
        s.set(Channel::AccelerationX, 1.0);
        s.set(Channel::Co2, 412.0);
        assert_eq!(s.to_wire().unwrap(), r#"{"accelerationX":1.0,"co2":412.0}"#);
    }

    #[test]
    fn test_empty_snapshot() {
        let mut s = Snapshot::default();
        assert!(s.is_empty());
        s.set(Channel::Adc2, 0.5);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let s = Snapshot::parse(r#"{"AccelerationX": 0.1, "TVOC": 2.5, "CO2": 400}"#).unwrap();
        assert_eq!(s.acceleration_x, Some(0.1));
        assert_eq!(s.tvoc, Some(2.5));
        assert_eq!(s.co2, Some(400.0));
        assert_eq!(s.temperature, None);
    }

    #[test]
    fn test_parse_accepts_legacy_adc_names() {
        let s = Snapshot::parse(r#"{"ADC0Value": 1.2, "adC3Value": 3.3}"#).unwrap();
        assert_eq!(s.adc0, Some(1.2));
        assert_eq!(s.adc3, Some(3.3));

        let minimal = Snapshot::parse(r#"{"adcValue": 0.7}"#).unwrap();
        assert_eq!(minimal.adc0, Some(0.7));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let s = Snapshot::parse(r#"{"humidity": 40.0, "firmware": "1.2"}"#).unwrap();
        assert_eq!(s.humidity, Some(40.0));
    }

    #[test]
    fn test_parse_drops_non_snapshots() {
        assert!(Snapshot::parse("not json").is_err());
        assert!(Snapshot::parse("[1, 2, 3]").is_err());
        assert!(Snapshot::parse(r#"{"message": "Server shutdown", "timestamp": 1}"#).is_err());
        assert!(Snapshot::parse(r#"{"temperature": "warm"}"#).is_err());
        assert!(Snapshot::parse(r#"{"temperature": null}"#).is_err());
    }

    #[test]
    fn test_parse_explains_rejection() {
        assert!(matches!(Snapshot::parse("[]"), Err(TelemetryError::Malformed(_))));
        assert!(matches!(Snapshot::parse("{oops"), Err(TelemetryError::Json(_))));
        assert!(matches!(Snapshot::parse(r#"{"co2": true}"#), Err(TelemetryError::Malformed(_))));
        assert!(matches!(Snapshot::parse(r#"{"message": "hi"}"#), Err(TelemetryError::Malformed(_))));
    }

    #[test]
    fn test_acceleration_requires_all_axes() {
        let mut s = Snapshot::default();
        s.set(Channel::AccelerationX, 1.0);
        s.set(Channel::AccelerationY, 0.0);
        assert!(s.acceleration().is_none());
        s.set(Channel::AccelerationZ, 9.8);
        assert_eq!(s.acceleration().unwrap().component(Axis::Z), 9.8);
    }

    #[test]
    fn test_axis_cycles_and_wraps() {
        assert_eq!(Axis::default(), Axis::Z);
        assert_eq!(Axis::Z.next(), Axis::X);
        assert_eq!(Axis::X.previous(), Axis::Z);
        for axis in Axis::ALL {
            assert_eq!(axis.next().previous(), axis);
        }
    }

    #[test]
    fn test_channel_lookup() {
        assert_eq!(Channel::from_name("ACCELERATIONz"), Some(Channel::AccelerationZ));
        assert_eq!(Channel::from_name("pressure"), None);
        assert_eq!(Channel::from_name("adc2Value"), Some(Channel::Adc2));
        assert_eq!(Channel::ADC[3], Channel::Adc3);
    }
}
