//! ---
//! sim_section: "03-broker-client"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "MQTT broker client lifecycle and publishing."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! MQTT broker client for the IoT-Sim project.
//!
//! Wraps `rumqttc` behind the [`ReadingPublisher`] seam: connection
//! establishment with timeout, JSON publishing, and an explicit connection
//! state machine signalled over a watch channel.

pub mod client;
pub mod error;

pub use client::{ConnectionState, MqttBroker, ReadingPublisher, DEFAULT_QOS};
pub use error::{BrokerError, Result};
