//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! Test doubles for the broker seam, shared by the crate's own tests and the
//! workspace integration suite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iotsim_broker::{BrokerError, ConnectionState, ReadingPublisher};
use iotsim_sensors::SensorReading;
use parking_lot::Mutex;
use tokio::sync::watch;

/// One message captured by the [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub qos: u8,
    pub retain: bool,
}

/// In-memory [`ReadingPublisher`] that records submissions instead of
/// talking to a broker. Connect and publish failures can be injected.
pub struct RecordingPublisher {
    state: watch::Sender<ConnectionState>,
    published: Mutex<Vec<PublishedMessage>>,
    fail_connect: bool,
    fail_publish: AtomicBool,
    panic_on_publish: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: watch::channel(ConnectionState::Disconnected).0,
            published: Mutex::new(Vec::new()),
            fail_connect: false,
            fail_publish: AtomicBool::new(false),
            panic_on_publish: AtomicBool::new(false),
        })
    }

    /// A publisher whose every connection attempt is refused.
    pub fn failing_connect() -> Arc<Self> {
        Arc::new(Self {
            state: watch::channel(ConnectionState::Disconnected).0,
            published: Mutex::new(Vec::new()),
            fail_connect: true,
            fail_publish: AtomicBool::new(false),
            panic_on_publish: AtomicBool::new(false),
        })
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Make the next publishes panic instead of returning an error, for
    /// exercising fault containment in the scheduler loop.
    pub fn set_panic_on_publish(&self, panic: bool) {
        self.panic_on_publish.store(panic, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }

    pub fn topics(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|message| message.topic.clone())
            .collect()
    }
}

#[async_trait]
impl ReadingPublisher for RecordingPublisher {
    async fn connect(&self, _timeout: Duration) -> Result<(), BrokerError> {
        if self.fail_connect {
            return Err(BrokerError::Connection("connection refused".to_owned()));
        }
        self.state.send_replace(ConnectionState::Connected);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        reading: &SensorReading,
        qos: u8,
        retain: bool,
    ) -> Result<(), BrokerError> {
        if !matches!(*self.state.borrow(), ConnectionState::Connected) {
            return Err(BrokerError::NotConnected);
        }
        if self.panic_on_publish.load(Ordering::SeqCst) {
            panic!("injected publish fault");
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                topic: topic.to_owned(),
                reason: "injected publish failure".to_owned(),
            });
        }
        let payload = serde_json::to_value(reading)?;
        self.published.lock().push(PublishedMessage {
            topic: topic.to_owned(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}
