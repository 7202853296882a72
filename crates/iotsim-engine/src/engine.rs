//! ---
//! sim_section: "04-simulation-scheduler"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Simulation scheduler and live fanout."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use iotsim_broker::{ReadingPublisher, DEFAULT_QOS};
use iotsim_common::config::{SimulationConfig, INTERVAL_RANGE_SECS};
use iotsim_sensors::SensorKind;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::live::{LiveBroadcaster, LiveEvent};
use crate::state::{SensorSet, SimulationState};

const LIVE_CHANNEL_CAPACITY: usize = 64;

/// Partial temperature parameter update, merged into the current config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemperatureUpdate {
    base_temp: Option<f64>,
    noise_range: Option<f64>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HumidityUpdate {
    initial_humidity: Option<f64>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GpsUpdate {
    lat: Option<f64>,
    lon: Option<f64>,
    enabled: Option<bool>,
}

/// The simulation scheduler.
///
/// Owns the singleton [`SimulationState`], the sensor instance table, the
/// broker publisher, and the live fanout channel. Control operations come in
/// from the request-handling context; at most one background tick loop runs
/// while the state is `running`.
pub struct SimulatorEngine {
    state: Mutex<SimulationState>,
    sensors: Mutex<Option<SensorSet>>,
    publisher: Arc<dyn ReadingPublisher>,
    live: LiveBroadcaster,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    // Serializes start/stop so concurrent starts cannot both spawn a loop.
    control: AsyncMutex<()>,
    connect_timeout: Duration,
    seed: Option<u64>,
}

impl SimulatorEngine {
    pub fn new(
        config: &SimulationConfig,
        connect_timeout: Duration,
        publisher: Arc<dyn ReadingPublisher>,
    ) -> Self {
        Self {
            state: Mutex::new(SimulationState::from_config(config)),
            sensors: Mutex::new(None),
            publisher,
            live: LiveBroadcaster::new(LIVE_CHANNEL_CAPACITY),
            shutdown: Mutex::new(None),
            tick_task: Mutex::new(None),
            control: AsyncMutex::new(()),
            connect_timeout,
            seed: config.random_seed,
        }
    }

    /// Attach a live subscriber. Callers should send the current
    /// [`SimulationState`] snapshot to a fresh client before forwarding
    /// events, see the API crate's live view handler.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.live.subscribe()
    }

    /// Full state snapshot for the control surface.
    pub fn status(&self) -> SimulationState {
        self.state.lock().clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.state.lock().session_id
    }

    /// Re-issue the session identifier, invalidating stale live-view links.
    pub fn new_session(&self) -> Uuid {
        let mut state = self.state.lock();
        state.session_id = Uuid::new_v4();
        info!(session_id = %state.session_id, "new session issued");
        state.session_id
    }

    /// Start the simulation: rebuild sensors from the current configs,
    /// connect to the broker (fail closed), then spawn the tick loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let _control = self.control.lock().await;
        if self.state.lock().running {
            return Err(EngineError::AlreadyRunning);
        }

        {
            let state = self.state.lock();
            *self.sensors.lock() = Some(SensorSet::from_config(&state.sensors, self.seed));
        }

        self.publisher.connect(self.connect_timeout).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state.lock().running = true;
        *self.shutdown.lock() = Some(shutdown_tx);

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            engine.run_loop(shutdown_rx).await;
        });
        *self.tick_task.lock() = Some(task);

        info!("simulation started");
        Ok(())
    }

    /// Stop the simulation and tear down the broker connection. Does not
    /// interrupt an in-flight tick; the loop exit is awaited.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let _control = self.control.lock().await;
        {
            let mut state = self.state.lock();
            if !state.running {
                return Err(EngineError::NotRunning);
            }
            state.running = false;
        }

        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(true);
        }
        let task = self.tick_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(error = %err, "tick loop join error");
            }
        }
        self.publisher.disconnect().await;

        info!("simulation stopped");
        Ok(())
    }

    /// Update the publish interval, applied from the next tick onwards.
    pub fn update_interval(&self, interval_secs: f64) -> Result<(), EngineError> {
        if !INTERVAL_RANGE_SECS.contains(&interval_secs) {
            return Err(EngineError::InvalidInterval(interval_secs));
        }
        self.state.lock().interval = interval_secs;
        info!(interval_secs, "publish interval updated");
        Ok(())
    }

    /// Update one sensor's parameters from a JSON params object.
    ///
    /// Rejected synchronously on unknown kinds or malformed params. When the
    /// simulation is running, the live instance is reconfigured: temperature
    /// is replaced, humidity/GPS drift state is overwritten in place.
    pub fn update_sensor(
        &self,
        sensor: &str,
        params: serde_json::Value,
    ) -> Result<(), EngineError> {
        let kind = sensor
            .parse::<SensorKind>()
            .map_err(|_| EngineError::UnknownSensor(sensor.to_owned()))?;

        let sensors_snapshot = {
            let mut state = self.state.lock();
            match kind {
                SensorKind::Temperature => {
                    let update: TemperatureUpdate = serde_json::from_value(params)
                        .map_err(|err| EngineError::InvalidSensorParams(err.to_string()))?;
                    let mut next = state.sensors.temperature.clone();
                    if let Some(base_temp) = update.base_temp {
                        next.base_temp = base_temp;
                    }
                    if let Some(noise_range) = update.noise_range {
                        if noise_range < 0.0 {
                            return Err(EngineError::InvalidSensorParams(
                                "noise_range must be non-negative".to_owned(),
                            ));
                        }
                        next.noise_range = noise_range;
                    }
                    if let Some(enabled) = update.enabled {
                        next.enabled = enabled;
                    }
                    state.sensors.temperature = next;
                }
                SensorKind::Humidity => {
                    let update: HumidityUpdate = serde_json::from_value(params)
                        .map_err(|err| EngineError::InvalidSensorParams(err.to_string()))?;
                    if let Some(initial_humidity) = update.initial_humidity {
                        state.sensors.humidity.initial_humidity = initial_humidity;
                    }
                    if let Some(enabled) = update.enabled {
                        state.sensors.humidity.enabled = enabled;
                    }
                }
                SensorKind::Gps => {
                    let update: GpsUpdate = serde_json::from_value(params)
                        .map_err(|err| EngineError::InvalidSensorParams(err.to_string()))?;
                    if let Some(lat) = update.lat {
                        state.sensors.gps.lat = lat;
                    }
                    if let Some(lon) = update.lon {
                        state.sensors.gps.lon = lon;
                    }
                    if let Some(enabled) = update.enabled {
                        state.sensors.gps.enabled = enabled;
                    }
                }
            }
            if !state.running {
                None
            } else {
                Some(state.sensors.clone())
            }
        };

        if let Some(sensors) = sensors_snapshot {
            if let Some(set) = self.sensors.lock().as_mut() {
                set.reconfigure(kind, &sensors, self.seed);
            }
        }

        info!(sensor = %kind, "sensor parameters updated");
        Ok(())
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("tick loop started");
        loop {
            if !self.state.lock().running {
                break;
            }
            // A fault inside a tick must not leave a dead loop that still
            // reports running; treat it as unrecoverable and exit cleanly.
            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                error!("tick panicked; stopping the simulation loop");
                break;
            }

            let interval = Duration::from_secs_f64(self.state.lock().interval);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    debug!("tick loop received shutdown signal");
                    break;
                }
            }
        }
        // The flag stays controlled by the state machine even if the loop
        // exits without a stop().
        self.state.lock().running = false;
        info!("tick loop stopped");
    }

    /// One scheduler tick: read every enabled sensor, publish to the broker,
    /// fan the same reading out to live subscribers. A failure on one sensor
    /// never aborts the tick, and a broker failure never blocks local fanout.
    async fn tick(&self) {
        let snapshot = self.status();
        for kind in SensorKind::ALL {
            if !snapshot.enabled(kind) {
                continue;
            }
            let reading = {
                let mut sensors = self.sensors.lock();
                match sensors.as_mut() {
                    Some(set) => set.read(kind),
                    None => {
                        warn!("tick ran without an initialized sensor table");
                        return;
                    }
                }
            };

            if let Err(err) = self
                .publisher
                .publish(kind.topic(), &reading, DEFAULT_QOS, false)
                .await
            {
                warn!(sensor = %kind, error = %err, "broker publish failed; reading dropped from broker stream");
            }

            self.live.send(LiveEvent::reading(kind, reading));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPublisher;
    use serde_json::json;

    fn engine_with(publisher: Arc<RecordingPublisher>) -> Arc<SimulatorEngine> {
        let config = SimulationConfig {
            interval_secs: 60.0,
            random_seed: Some(42),
            ..SimulationConfig::default()
        };
        Arc::new(SimulatorEngine::new(
            &config,
            Duration::from_secs(1),
            publisher,
        ))
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let engine = engine_with(RecordingPublisher::new());
        assert!(matches!(
            engine.update_interval(0.0),
            Err(EngineError::InvalidInterval(_))
        ));
        assert!(matches!(
            engine.update_interval(61.0),
            Err(EngineError::InvalidInterval(_))
        ));
        engine.update_interval(0.1).unwrap();
        engine.update_interval(60.0).unwrap();
        assert_eq!(engine.status().interval, 60.0);
    }

    #[test]
    fn unknown_sensor_is_rejected() {
        let engine = engine_with(RecordingPublisher::new());
        let result = engine.update_sensor("pressure", json!({"enabled": false}));
        assert!(matches!(result, Err(EngineError::UnknownSensor(_))));
    }

    #[test]
    fn malformed_params_are_rejected_and_not_applied() {
        let engine = engine_with(RecordingPublisher::new());
        let before = engine.status().sensors.temperature.clone();
        let result = engine.update_sensor("temperature", json!({"bass_temp": 30.0}));
        assert!(matches!(result, Err(EngineError::InvalidSensorParams(_))));
        assert_eq!(engine.status().sensors.temperature, before);

        let result = engine.update_sensor("temperature", json!({"noise_range": -2.0}));
        assert!(matches!(result, Err(EngineError::InvalidSensorParams(_))));
        assert_eq!(engine.status().sensors.temperature, before);
    }

    #[test]
    fn sensor_update_merges_partial_params() {
        let engine = engine_with(RecordingPublisher::new());
        engine
            .update_sensor("temperature", json!({"base_temp": 30.0}))
            .unwrap();
        let config = engine.status().sensors.temperature;
        assert_eq!(config.base_temp, 30.0);
        // Untouched fields keep their previous values.
        assert_eq!(config.noise_range, 2.5);
        assert!(config.enabled);
    }

    #[test]
    fn new_session_changes_identifier() {
        let engine = engine_with(RecordingPublisher::new());
        let first = engine.session_id();
        let second = engine.new_session();
        assert_ne!(first, second);
        assert_eq!(engine.session_id(), second);
    }

    #[tokio::test]
    async fn stop_when_stopped_is_an_error() {
        let engine = engine_with(RecordingPublisher::new());
        assert!(matches!(engine.stop().await, Err(EngineError::NotRunning)));
        assert!(!engine.status().running);
    }

    #[tokio::test]
    async fn tick_panic_clears_the_running_flag() {
        let publisher = RecordingPublisher::new();
        publisher.set_panic_on_publish(true);
        let engine = engine_with(publisher.clone());

        engine.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.status().running {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("running flag cleared after faulting tick");

        // The state machine stays usable after the fault.
        publisher.set_panic_on_publish(false);
        engine.start().await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn broker_failure_does_not_block_fanout() {
        let publisher = RecordingPublisher::new();
        publisher.set_fail_publish(true);
        let engine = engine_with(publisher.clone());
        let mut events = engine.subscribe();

        engine.start().await.unwrap();
        // Interval is 60s, so exactly the first tick's readings arrive.
        for _ in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("live event within timeout")
                .unwrap();
            assert!(matches!(event, LiveEvent::SensorData { .. }));
        }
        assert!(publisher.published().is_empty());
        engine.stop().await.unwrap();
    }
}
