//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! Simulation scheduler for the IoT-Sim project.
//!
//! Owns the run/stop state machine, ticks every configured interval, reads
//! each enabled sensor, publishes to the broker, and fans the same reading
//! out to live subscribers.

pub mod engine;
pub mod error;
pub mod live;
pub mod state;
pub mod testing;

pub use engine::SimulatorEngine;
pub use error::EngineError;
pub use live::{LiveBroadcaster, LiveEvent};
pub use state::SimulationState;
