//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use iotsim_sensors::{SensorKind, SensorReading};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::state::SimulationState;

/// Event pushed to live subscribers: a state snapshot on attach, then one
/// `sensor_data` event per produced reading, tagged with its kind.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    Status { state: SimulationState },
    SensorData { sensor: SensorKind, data: SensorReading },
}

/// Broadcasts live events to all attached subscribers, decoupled from the
/// broker client so broker outages never block local delivery.
#[derive(Debug, Clone)]
pub struct LiveBroadcaster {
    tx: broadcast::Sender<LiveEvent>,
}

impl LiveBroadcaster {
    /// Create a broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send an event to subscribers. Returns the number of peers reached;
    /// an empty audience is not an error for the tick loop.
    pub fn send(&self, event: LiveEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }
}

impl LiveEvent {
    pub fn reading(sensor: SensorKind, data: SensorReading) -> Self {
        LiveEvent::SensorData { sensor, data }
    }
}
