//! ---
//! sim_section: "03-broker-client"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "MQTT broker client lifecycle and publishing."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Failures surfaced by the broker client. `Connection`/`ConnectTimeout` map
/// to the connection-error class handled by the scheduler's fail-closed
/// start; `Serialize`/`Publish` are per-reading publish errors that never
/// abort a tick.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("not connected to broker")]
    NotConnected,
    #[error("failed to serialize reading payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("publish on topic {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("invalid qos level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),
}
