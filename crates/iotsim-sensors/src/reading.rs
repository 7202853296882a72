//! ---
//! sim_section: "02-sensor-models"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulated sensor models and reading types."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sensor kinds supported by the simulator, in scheduling order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Gps,
}

impl SensorKind {
    /// All kinds in the order the scheduler processes them.
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Gps,
    ];

    /// Broker topic readings of this kind are published on.
    pub fn topic(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "iot/sensor/temperature",
            SensorKind::Humidity => "iot/sensor/humidity",
            SensorKind::Gps => "iot/sensor/gps",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Gps => "gps",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "temperature" => Ok(SensorKind::Temperature),
            "humidity" => Ok(SensorKind::Humidity),
            "gps" => Ok(SensorKind::Gps),
            other => Err(format!("unknown sensor kind: {}", other)),
        }
    }
}

/// Numeric payload carried by a reading: a scalar for temperature/humidity,
/// a lat/lon pair for GPS.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReadingValue {
    Scalar { value: f64 },
    Position { lat: f64, lon: f64 },
}

/// One immutable sensor reading, stamped with the production time in UTC.
///
/// Serializes to the wire shape consumed by broker subscribers and the live
/// view, e.g. `{"timestamp":"...","sensor":"temperature","value":21.87,"unit":"°C"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub sensor: SensorKind,
    #[serde(flatten)]
    pub value: ReadingValue,
    pub unit: String,
}

impl SensorReading {
    pub fn scalar(sensor: SensorKind, value: f64, unit: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            sensor,
            value: ReadingValue::Scalar { value },
            unit: unit.to_owned(),
        }
    }

    pub fn position(lat: f64, lon: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            sensor: SensorKind::Gps,
            value: ReadingValue::Position { lat, lon },
            unit: "degrees".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_reading_serializes_flat() {
        let reading = SensorReading::scalar(SensorKind::Temperature, 21.87, "°C");
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["sensor"], "temperature");
        assert_eq!(value["value"], 21.87);
        assert_eq!(value["unit"], "°C");
        assert!(value["timestamp"].is_string());
        assert!(value.get("lat").is_none());
    }

    #[test]
    fn position_reading_serializes_lat_lon() {
        let reading = SensorReading::position(48.8566, 2.3522);
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["sensor"], "gps");
        assert_eq!(value["lat"], 48.8566);
        assert_eq!(value["lon"], 2.3522);
        assert_eq!(value["unit"], "degrees");
        assert!(value.get("value").is_none());
    }

    #[test]
    fn reading_roundtrips() {
        let reading = SensorReading::position(48.8566, 2.3522);
        let json = serde_json::to_string(&reading).unwrap();
        let parsed: SensorReading = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reading);
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("GPS".parse::<SensorKind>().unwrap(), SensorKind::Gps);
        assert!("pressure".parse::<SensorKind>().is_err());
    }

    #[test]
    fn topics_are_kind_specific() {
        assert_eq!(SensorKind::Temperature.topic(), "iot/sensor/temperature");
        assert_eq!(SensorKind::Humidity.topic(), "iot/sensor/humidity");
        assert_eq!(SensorKind::Gps.topic(), "iot/sensor/gps");
    }
}
