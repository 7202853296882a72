//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Shared primitives and utilities for the simulator runtime."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Allowed publish interval range in seconds, bounds inclusive.
pub const INTERVAL_RANGE_SECS: RangeInclusive<f64> = 0.1..=60.0;

const ENV_BROKER_HOST: &str = "BROKER_HOST";
const ENV_BROKER_PORT: &str = "BROKER_PORT";

fn default_broker_host() -> String {
    "localhost".to_owned()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "iot_simulator_web".to_owned()
}

fn default_keepalive() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:5000".parse().expect("valid default api address")
}

fn default_interval_secs() -> f64 {
    1.0
}

fn default_base_temp() -> f64 {
    22.0
}

fn default_noise_range() -> f64 {
    2.5
}

fn default_initial_humidity() -> f64 {
    55.0
}

fn default_lat() -> f64 {
    48.8566
}

fn default_lon() -> f64 {
    2.3522
}

fn default_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the simulator runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "IOTSIM_CONFIG";

    /// Load configuration from disk, respecting the `IOTSIM_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BROKER_HOST`/`BROKER_PORT` environment overrides to the broker
    /// section. Invalid port values are rejected rather than ignored.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var(ENV_BROKER_HOST) {
            if !host.trim().is_empty() {
                self.broker.host = host;
            }
        }
        if let Ok(port) = std::env::var(ENV_BROKER_PORT) {
            self.broker.port = port
                .parse::<u16>()
                .with_context(|| format!("invalid {} value '{}'", ENV_BROKER_PORT, port))?;
        }
        Ok(())
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        if self.broker.host.trim().is_empty() {
            return Err(anyhow!("broker host must not be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection parameters for the MQTT broker.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keepalive")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub keepalive: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub connect_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            keepalive: default_keepalive(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Scheduler configuration: publish cadence and per-kind sensor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Fixed RNG seed for deterministic sensor streams; entropy-seeded when
    /// absent.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub sensors: SensorsConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            random_seed: None,
            sensors: SensorsConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !INTERVAL_RANGE_SECS.contains(&self.interval_secs) {
            return Err(anyhow!(
                "publish interval {}s outside allowed range {:.1}-{:.0}s",
                self.interval_secs,
                INTERVAL_RANGE_SECS.start(),
                INTERVAL_RANGE_SECS.end()
            ));
        }
        self.sensors.validate()
    }
}

/// Per-kind sensor parameter blocks, owned by the scheduler at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SensorsConfig {
    #[serde(default)]
    pub temperature: TemperatureConfig,
    #[serde(default)]
    pub humidity: HumidityConfig,
    #[serde(default)]
    pub gps: GpsConfig,
}

impl SensorsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.temperature.noise_range < 0.0 {
            return Err(anyhow!(
                "temperature noise_range must be non-negative, got {}",
                self.temperature.noise_range
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureConfig {
    #[serde(default = "default_base_temp")]
    pub base_temp: f64,
    /// Noise amplitude: ~99.7% of readings fall within `base_temp ± noise_range`.
    #[serde(default = "default_noise_range")]
    pub noise_range: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            base_temp: default_base_temp(),
            noise_range: default_noise_range(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumidityConfig {
    #[serde(default = "default_initial_humidity")]
    pub initial_humidity: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for HumidityConfig {
    fn default() -> Self {
        Self {
            initial_humidity: default_initial_humidity(),
            enabled: default_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpsConfig {
    #[serde(default = "default_lat")]
    pub lat: f64,
    #[serde(default = "default_lon")]
    pub lon: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            lat: default_lat(),
            lon: default_lon(),
            enabled: default_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.simulation.interval_secs, 1.0);
        assert_eq!(config.simulation.sensors.temperature.base_temp, 22.0);
        assert_eq!(config.simulation.sensors.humidity.initial_humidity, 55.0);
        assert_eq!(config.simulation.sensors.gps.lat, 48.8566);
        assert!(config.simulation.sensors.gps.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = AppConfig::from_str(
            r#"
            [broker]
            host = "mqtt.internal"
            port = 8883

            [simulation]
            interval_secs = 2.5

            [simulation.sensors.temperature]
            base_temp = 18.0
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "mqtt.internal");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.client_id, "iot_simulator_web");
        assert_eq!(config.simulation.interval_secs, 2.5);
        assert_eq!(config.simulation.sensors.temperature.base_temp, 18.0);
        assert_eq!(config.simulation.sensors.temperature.noise_range, 2.5);
    }

    #[test]
    fn rejects_out_of_range_interval() {
        let result = AppConfig::from_str(
            r#"
            [simulation]
            interval_secs = 61.0
            "#,
        );
        assert!(result.is_err());

        let result = AppConfig::from_str(
            r#"
            [simulation]
            interval_secs = 0.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn accepts_interval_bounds() {
        for interval in ["0.1", "60.0"] {
            let config = AppConfig::from_str(&format!(
                "[simulation]\ninterval_secs = {interval}\n"
            ))
            .unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn rejects_negative_noise_range() {
        let result = AppConfig::from_str(
            r#"
            [simulation.sensors.temperature]
            noise_range = -1.0
            "#,
        );
        assert!(result.is_err());
    }
}
