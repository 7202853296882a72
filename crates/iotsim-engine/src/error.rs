//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use iotsim_broker::BrokerError;
use thiserror::Error;

/// Errors surfaced by the control operations of the scheduler.
///
/// `InvalidInterval`, `UnknownSensor`, and `InvalidSensorParams` are
/// configuration errors rejected synchronously and never applied;
/// `Connection` makes `start()` fail closed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("simulation already running")]
    AlreadyRunning,
    #[error("simulation is not running")]
    NotRunning,
    #[error("invalid interval {0}s (allowed range 0.1-60s)")]
    InvalidInterval(f64),
    #[error("unknown sensor kind '{0}'")]
    UnknownSensor(String),
    #[error("invalid sensor parameters: {0}")]
    InvalidSensorParams(String),
    #[error("unable to connect to broker: {0}")]
    Connection(#[from] BrokerError),
}
