//! ---
//! sim_section: "02-sensor-models"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulated sensor models and reading types."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::f64::consts::TAU;

use iotsim_common::config::{GpsConfig, HumidityConfig, TemperatureConfig};
use rand::prelude::*;
use rand_distr::Normal;

use crate::reading::SensorReading;
use crate::SensorKind;

/// Default per-read GPS displacement cap in degrees (~11 metres).
pub const DEFAULT_MAX_MOVEMENT_DEG: f64 = 0.0001;

const MIN_HUMIDITY: f64 = 20.0;
const MAX_HUMIDITY: f64 = 80.0;
const HUMIDITY_STEP: f64 = 2.0;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Temperature sensor: Gaussian noise around a fixed baseline.
///
/// The noise standard deviation is `noise_range / 3`, so roughly 99.7% of
/// samples fall within `base_temp ± noise_range`. Stateless across reads
/// apart from configuration and the RNG stream.
#[derive(Debug)]
pub struct TemperatureSensor {
    base_temp: f64,
    noise: Normal<f64>,
    rng: StdRng,
}

impl TemperatureSensor {
    pub fn new(config: &TemperatureConfig) -> Self {
        Self::from_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: &TemperatureConfig, seed: u64) -> Self {
        Self::from_rng(config, StdRng::seed_from_u64(seed))
    }

    fn from_rng(config: &TemperatureConfig, rng: StdRng) -> Self {
        // Clamp keeps the constructor panic-free on a negative or NaN
        // noise_range; a zero sigma degenerates to the exact baseline.
        let sigma = (config.noise_range / 3.0).max(0.0);
        Self {
            base_temp: config.base_temp,
            noise: Normal::new(0.0, sigma).expect("sigma is non-negative after clamp"),
            rng,
        }
    }

    pub fn read(&mut self) -> SensorReading {
        let temperature = self.base_temp + self.noise.sample(&mut self.rng);
        SensorReading::scalar(SensorKind::Temperature, round_to(temperature, 2), "°C")
    }
}

/// Humidity sensor: slow random walk clamped to a plausible indoor range.
#[derive(Debug)]
pub struct HumiditySensor {
    current: f64,
    rng: StdRng,
}

impl HumiditySensor {
    pub fn new(config: &HumidityConfig) -> Self {
        Self {
            current: config.initial_humidity,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(config: &HumidityConfig, seed: u64) -> Self {
        Self {
            current: config.initial_humidity,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Hard-overwrite the walk state from a new configuration value.
    pub fn set_humidity(&mut self, humidity: f64) {
        self.current = humidity;
    }

    pub fn read(&mut self) -> SensorReading {
        let step = self.rng.gen_range(-HUMIDITY_STEP..=HUMIDITY_STEP);
        self.current = (self.current + step).clamp(MIN_HUMIDITY, MAX_HUMIDITY);
        SensorReading::scalar(SensorKind::Humidity, round_to(self.current, 2), "%")
    }
}

/// GPS sensor: random walk on a flat-plane approximation.
///
/// Each read picks a uniform heading in `[0, 2π)` and a uniform distance in
/// `[0, max_movement]`, acceptable at metre scale without spherical
/// correction.
#[derive(Debug)]
pub struct GpsSensor {
    lat: f64,
    lon: f64,
    max_movement: f64,
    rng: StdRng,
}

impl GpsSensor {
    pub fn new(config: &GpsConfig) -> Self {
        Self {
            lat: config.lat,
            lon: config.lon,
            max_movement: DEFAULT_MAX_MOVEMENT_DEG,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(config: &GpsConfig, seed: u64) -> Self {
        Self {
            lat: config.lat,
            lon: config.lon,
            max_movement: DEFAULT_MAX_MOVEMENT_DEG,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Hard-overwrite the walk position from new configuration values.
    pub fn set_position(&mut self, lat: f64, lon: f64) {
        self.lat = lat;
        self.lon = lon;
    }

    pub fn read(&mut self) -> SensorReading {
        let heading = self.rng.gen_range(0.0..TAU);
        let distance = self.rng.gen_range(0.0..=self.max_movement);
        self.lat += distance * heading.cos();
        self.lon += distance * heading.sin();
        SensorReading::position(round_to(self.lat, 6), round_to(self.lon, 6))
    }
}
