//! ---
//! sim_section: "09-testing"
//! sim_subsection: "integration-tests"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Integration and validation tests for the IoT-Sim stack."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! End-to-end scheduler lifecycle against the recording broker double.

use std::sync::Arc;
use std::time::Duration;

use iotsim_common::config::SimulationConfig;
use iotsim_engine::testing::RecordingPublisher;
use iotsim_engine::{EngineError, SimulatorEngine};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::{sleep, timeout};

fn engine_with(
    config: SimulationConfig,
    publisher: Arc<RecordingPublisher>,
) -> Arc<SimulatorEngine> {
    Arc::new(SimulatorEngine::new(
        &config,
        Duration::from_secs(1),
        publisher,
    ))
}

/// A 60s interval gives exactly one tick per start in a test's lifetime, so
/// publish counts are deterministic.
fn slow_config() -> SimulationConfig {
    SimulationConfig {
        interval_secs: 60.0,
        random_seed: Some(7),
        ..SimulationConfig::default()
    }
}

fn fast_config() -> SimulationConfig {
    SimulationConfig {
        interval_secs: 0.1,
        random_seed: Some(7),
        ..SimulationConfig::default()
    }
}

#[tokio::test]
async fn first_tick_publishes_every_enabled_sensor() {
    let publisher = RecordingPublisher::new();
    let engine = engine_with(slow_config(), publisher.clone());
    let mut events = engine.subscribe();

    engine.start().await.unwrap();
    for _ in 0..3 {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("live event within timeout")
            .unwrap();
    }

    assert_eq!(
        publisher.topics(),
        vec![
            "iot/sensor/temperature",
            "iot/sensor/humidity",
            "iot/sensor/gps"
        ]
    );
    for message in publisher.published() {
        assert_eq!(message.qos, 1);
        assert!(!message.retain);
        assert!(message.payload["timestamp"].is_string());
    }
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let publisher = RecordingPublisher::new();
    let engine = engine_with(slow_config(), publisher.clone());
    let mut events = engine.subscribe();

    engine.start().await.unwrap();
    assert!(engine.status().running);
    for _ in 0..3 {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("live event within timeout")
            .unwrap();
    }

    assert!(matches!(
        engine.start().await,
        Err(EngineError::AlreadyRunning)
    ));
    // A rejected start spawns no second loop; only the first tick published.
    assert_eq!(publisher.published().len(), 3);

    engine.stop().await.unwrap();
    assert!(!engine.status().running);
}

#[tokio::test]
async fn restart_after_stop_succeeds() {
    let publisher = RecordingPublisher::new();
    let engine = engine_with(slow_config(), publisher.clone());

    engine.start().await.unwrap();
    engine.stop().await.unwrap();
    publisher.clear();

    engine.start().await.unwrap();
    assert!(engine.status().running);
    let mut events = engine.subscribe();
    // The restarted loop keeps ticking, so a fresh subscriber still gets data.
    sleep(Duration::from_millis(100)).await;
    engine.stop().await.unwrap();
    assert!(!engine.status().running);
    assert!(matches!(
        events.try_recv(),
        Ok(_) | Err(TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn unreachable_broker_fails_closed() {
    let publisher = RecordingPublisher::failing_connect();
    let engine = engine_with(slow_config(), publisher.clone());
    let mut events = engine.subscribe();

    assert!(matches!(
        engine.start().await,
        Err(EngineError::Connection(_))
    ));
    assert!(!engine.status().running);

    sleep(Duration::from_millis(200)).await;
    assert!(publisher.published().is_empty());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn disabling_a_sensor_takes_effect_on_the_next_tick() {
    let publisher = RecordingPublisher::new();
    let engine = engine_with(fast_config(), publisher.clone());

    engine.start().await.unwrap();
    sleep(Duration::from_millis(250)).await;
    assert!(publisher
        .topics()
        .iter()
        .any(|topic| topic == "iot/sensor/humidity"));

    engine
        .update_sensor("humidity", json!({"enabled": false}))
        .unwrap();
    // Let any in-flight tick drain before observing.
    sleep(Duration::from_millis(200)).await;
    publisher.clear();
    sleep(Duration::from_millis(400)).await;

    let topics = publisher.topics();
    assert!(!topics.is_empty());
    assert!(topics.iter().all(|topic| topic != "iot/sensor/humidity"));
    assert!(topics.iter().any(|topic| topic == "iot/sensor/temperature"));
    assert!(topics.iter().any(|topic| topic == "iot/sensor/gps"));

    engine
        .update_sensor("humidity", json!({"enabled": true}))
        .unwrap();
    publisher.clear();
    sleep(Duration::from_millis(400)).await;
    assert!(publisher
        .topics()
        .iter()
        .any(|topic| topic == "iot/sensor/humidity"));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn zero_noise_temperature_publishes_the_base_value() {
    let mut config = fast_config();
    config.sensors.temperature.base_temp = 20.0;
    config.sensors.temperature.noise_range = 0.0;
    config.sensors.humidity.enabled = false;
    config.sensors.gps.enabled = false;
    let publisher = RecordingPublisher::new();
    let engine = engine_with(config, publisher.clone());

    engine.start().await.unwrap();
    sleep(Duration::from_millis(350)).await;
    engine.stop().await.unwrap();

    let published = publisher.published();
    assert!(published.len() >= 2, "expected several ticks at 0.1s");
    for message in &published {
        assert_eq!(message.topic, "iot/sensor/temperature");
        assert_eq!(message.payload["sensor"], "temperature");
        assert_eq!(message.payload["value"], 20.0);
        assert_eq!(message.payload["unit"], "°C");
    }
}

#[tokio::test]
async fn interval_change_applies_to_a_running_loop() {
    let publisher = RecordingPublisher::new();
    let engine = engine_with(slow_config(), publisher.clone());

    engine.start().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(publisher.published().len(), 3);

    // Shrinking the interval takes effect once the current sleep elapses,
    // so the state reflects it immediately while the loop catches up later.
    engine.update_interval(0.1).unwrap();
    assert_eq!(engine.status().interval, 0.1);

    engine.stop().await.unwrap();
}
