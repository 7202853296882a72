//! ---
//! sim_section: "03-broker-client"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "MQTT broker client lifecycle and publishing."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use iotsim_common::config::BrokerConfig;
use iotsim_sensors::SensorReading;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{BrokerError, Result};

/// Default QoS for sensor readings (at-least-once).
pub const DEFAULT_QOS: u8 = 1;

const EVENT_LOOP_CAPACITY: usize = 16;

/// Connection lifecycle of the broker client.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Seam between the scheduler and the broker so tests can substitute a
/// recording double for the real MQTT client.
#[async_trait]
pub trait ReadingPublisher: Send + Sync {
    /// Establish a broker connection, waiting up to `timeout` for the
    /// acknowledgement. Leaves the client disconnected on failure.
    async fn connect(&self, timeout: Duration) -> Result<()>;

    /// Publish one reading as a UTF-8 JSON payload. Fails fast with
    /// [`BrokerError::NotConnected`] when no connection is established.
    async fn publish(&self, topic: &str, reading: &SensorReading, qos: u8, retain: bool)
        -> Result<()>;

    /// Tear the connection down, transitioning to `Disconnected`
    /// unconditionally.
    async fn disconnect(&self);

    fn state(&self) -> ConnectionState;
}

struct ActiveConnection {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

/// MQTT broker client backed by `rumqttc`.
///
/// Connection state transitions are signalled on a watch channel; an
/// unsolicited drop by the broker flips the state to `Disconnected` without
/// retrying. Reconnection supervision stays with the caller.
pub struct MqttBroker {
    config: BrokerConfig,
    state_tx: watch::Sender<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
}

impl MqttBroker {
    pub fn new(config: BrokerConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state_tx,
            active: Mutex::new(None),
        }
    }

    /// Subscribe to connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

impl fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttBroker")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("client_id", &self.config.client_id)
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReadingPublisher for MqttBroker {
    async fn connect(&self, timeout: Duration) -> Result<()> {
        let mut active = self.active.lock().await;
        if matches!(*self.state_tx.borrow(), ConnectionState::Connected) {
            return Ok(());
        }
        if let Some(stale) = active.take() {
            stale.event_loop.abort();
        }

        let _ = self.state_tx.send(ConnectionState::Connecting);
        info!(host = %self.config.host, port = self.config.port, "connecting to mqtt broker");

        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keepalive);
        let (client, event_loop) = AsyncClient::new(options, EVENT_LOOP_CAPACITY);
        let task = tokio::spawn(drive_event_loop(event_loop, self.state_tx.clone()));
        *active = Some(ActiveConnection {
            client,
            event_loop: task,
        });

        let mut state_rx = self.state_tx.subscribe();
        let wait_connected = async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected => {
                        return Err(BrokerError::Connection(
                            "broker rejected or dropped the connection".to_owned(),
                        ))
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(BrokerError::Connection(
                        "connection state channel closed".to_owned(),
                    ));
                }
            }
        };

        let result = match tokio::time::timeout(timeout, wait_connected).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectTimeout(timeout)),
        };

        match &result {
            Ok(()) => {
                info!(host = %self.config.host, port = self.config.port, "connected to mqtt broker");
            }
            Err(err) => {
                warn!(host = %self.config.host, port = self.config.port, error = %err, "broker connection attempt failed");
                if let Some(failed) = active.take() {
                    failed.event_loop.abort();
                }
                let _ = self.state_tx.send(ConnectionState::Disconnected);
            }
        }
        result
    }

    async fn publish(
        &self,
        topic: &str,
        reading: &SensorReading,
        qos: u8,
        retain: bool,
    ) -> Result<()> {
        let qos = qos_from_u8(qos)?;
        if !matches!(*self.state_tx.borrow(), ConnectionState::Connected) {
            return Err(BrokerError::NotConnected);
        }
        let payload = serde_json::to_vec(reading)?;
        let client = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(connection) => connection.client.clone(),
                None => return Err(BrokerError::NotConnected),
            }
        };
        client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|err| BrokerError::Publish {
                topic: topic.to_owned(),
                reason: err.to_string(),
            })?;
        debug!(topic, "reading submitted to broker");
        Ok(())
    }

    async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        if let Some(connection) = active.take() {
            if let Err(err) = connection.client.disconnect().await {
                debug!(error = %err, "mqtt disconnect request failed");
            }
            let mut event_loop = connection.event_loop;
            // The outgoing disconnect terminates the event loop; cap the wait.
            if tokio::time::timeout(Duration::from_secs(1), &mut event_loop)
                .await
                .is_err()
            {
                event_loop.abort();
            }
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
        info!("disconnected from mqtt broker");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}

/// Drive the rumqttc event loop until the connection ends.
///
/// Terminates on the first connection error or disconnect: the broker client
/// does not reconnect on its own, the scheduler owns any supervision policy.
async fn drive_event_loop(mut event_loop: EventLoop, state: watch::Sender<ConnectionState>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    let _ = state.send(ConnectionState::Connected);
                } else {
                    warn!(code = ?ack.code, "broker refused connection");
                    let _ = state.send(ConnectionState::Disconnected);
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker closed the connection");
                let _ = state.send(ConnectionState::Disconnected);
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = state.send(ConnectionState::Disconnected);
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "mqtt event loop error; connection lost");
                let _ = state.send(ConnectionState::Disconnected);
                break;
            }
        }
    }
}

fn qos_from_u8(qos: u8) -> Result<QoS> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BrokerError::InvalidQos(other)),
    }
}
