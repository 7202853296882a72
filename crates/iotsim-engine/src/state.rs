//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use iotsim_common::config::{SensorsConfig, SimulationConfig};
use iotsim_sensors::{GpsSensor, HumiditySensor, SensorKind, SensorReading, TemperatureSensor};
use serde::Serialize;
use uuid::Uuid;

/// Process-wide simulation state snapshot. The `running` flag is the sole
/// coordination signal between the tick loop and control operations.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimulationState {
    pub running: bool,
    pub interval: f64,
    pub session_id: Uuid,
    pub sensors: SensorsConfig,
}

impl SimulationState {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            running: false,
            interval: config.interval_secs,
            session_id: Uuid::new_v4(),
            sensors: config.sensors.clone(),
        }
    }

    pub fn enabled(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Temperature => self.sensors.temperature.enabled,
            SensorKind::Humidity => self.sensors.humidity.enabled,
            SensorKind::Gps => self.sensors.gps.enabled,
        }
    }
}

/// The per-run sensor instance table, rebuilt on every `start()`.
pub(crate) struct SensorSet {
    temperature: TemperatureSensor,
    humidity: HumiditySensor,
    gps: GpsSensor,
}

impl SensorSet {
    pub(crate) fn from_config(sensors: &SensorsConfig, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self {
                temperature: TemperatureSensor::with_seed(&sensors.temperature, seed),
                humidity: HumiditySensor::with_seed(&sensors.humidity, seed.wrapping_add(1)),
                gps: GpsSensor::with_seed(&sensors.gps, seed.wrapping_add(2)),
            },
            None => Self {
                temperature: TemperatureSensor::new(&sensors.temperature),
                humidity: HumiditySensor::new(&sensors.humidity),
                gps: GpsSensor::new(&sensors.gps),
            },
        }
    }

    pub(crate) fn read(&mut self, kind: SensorKind) -> SensorReading {
        match kind {
            SensorKind::Temperature => self.temperature.read(),
            SensorKind::Humidity => self.humidity.read(),
            SensorKind::Gps => self.gps.read(),
        }
    }

    /// Apply a configuration change to a live instance. A temperature change
    /// replaces the instance (fresh noise centre); humidity and GPS changes
    /// hard-overwrite the current walk state from the new config values.
    pub(crate) fn reconfigure(&mut self, kind: SensorKind, sensors: &SensorsConfig, seed: Option<u64>) {
        match kind {
            SensorKind::Temperature => {
                self.temperature = match seed {
                    Some(seed) => TemperatureSensor::with_seed(&sensors.temperature, seed),
                    None => TemperatureSensor::new(&sensors.temperature),
                };
            }
            SensorKind::Humidity => {
                self.humidity.set_humidity(sensors.humidity.initial_humidity);
            }
            SensorKind::Gps => {
                self.gps.set_position(sensors.gps.lat, sensors.gps.lon);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iotsim_sensors::ReadingValue;

    fn scalar(reading: &SensorReading) -> f64 {
        match reading.value {
            ReadingValue::Scalar { value } => value,
            ReadingValue::Position { .. } => panic!("expected scalar reading"),
        }
    }

    #[test]
    fn humidity_reconfigure_overwrites_drift_state() {
        let mut sensors = SensorsConfig::default();
        let mut set = SensorSet::from_config(&sensors, Some(7));
        // Walk away from the initial value first.
        for _ in 0..20 {
            set.read(SensorKind::Humidity);
        }
        sensors.humidity.initial_humidity = 30.0;
        set.reconfigure(SensorKind::Humidity, &sensors, Some(7));
        let value = scalar(&set.read(SensorKind::Humidity));
        // One step of at most ±2 from the overwritten value.
        assert!((28.0..=32.0).contains(&value), "humidity {} not near 30", value);
    }

    #[test]
    fn gps_reconfigure_overwrites_position() {
        let mut sensors = SensorsConfig::default();
        let mut set = SensorSet::from_config(&sensors, Some(11));
        for _ in 0..20 {
            set.read(SensorKind::Gps);
        }
        sensors.gps.lat = 59.9139;
        sensors.gps.lon = 10.7522;
        set.reconfigure(SensorKind::Gps, &sensors, Some(11));
        match set.read(SensorKind::Gps).value {
            ReadingValue::Position { lat, lon } => {
                assert!((lat - 59.9139).abs() < 0.001);
                assert!((lon - 10.7522).abs() < 0.001);
            }
            ReadingValue::Scalar { .. } => panic!("expected position reading"),
        }
    }

    #[test]
    fn temperature_reconfigure_replaces_instance() {
        let mut sensors = SensorsConfig::default();
        sensors.temperature.noise_range = 0.0;
        let mut set = SensorSet::from_config(&sensors, Some(3));
        assert_eq!(scalar(&set.read(SensorKind::Temperature)), 22.0);
        sensors.temperature.base_temp = 5.0;
        set.reconfigure(SensorKind::Temperature, &sensors, Some(3));
        assert_eq!(scalar(&set.read(SensorKind::Temperature)), 5.0);
    }

    #[test]
    fn state_snapshot_tracks_enabled_flags() {
        let mut config = SimulationConfig::default();
        config.sensors.humidity.enabled = false;
        let state = SimulationState::from_config(&config);
        assert!(!state.running);
        assert!(state.enabled(SensorKind::Temperature));
        assert!(!state.enabled(SensorKind::Humidity));
        assert!(state.enabled(SensorKind::Gps));
    }
}
