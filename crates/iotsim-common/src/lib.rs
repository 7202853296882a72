//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Shared primitives and utilities for the simulator runtime."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! Core shared primitives for the IoT-Sim workspace.
//! This crate exposes configuration loading and logging bootstrap
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, ApiConfig, BrokerConfig, GpsConfig, HumidityConfig, LoggingConfig,
    SensorsConfig, SimulationConfig, TemperatureConfig, INTERVAL_RANGE_SECS,
};
pub use logging::{init_tracing, LogFormat};
