//! ---
//! sim_section: "02-sensor-models"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulated sensor models and reading types."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! Simulated sensor models for the IoT-Sim project.
//!
//! Each model produces one [`SensorReading`] per `read()` call, combining its
//! configured baseline with random noise or a random walk.

pub mod models;
pub mod reading;

pub use models::{GpsSensor, HumiditySensor, TemperatureSensor, DEFAULT_MAX_MOVEMENT_DEG};
pub use reading::{ReadingValue, SensorKind, SensorReading};
