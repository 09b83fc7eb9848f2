use std::path::Path;
use std::time::Duration;

use chrono::DateTime;

use devsim_config::DeviceConfig;
use devsim_core::reading::{DoorState, SensorReading};
use devsim_core::time::VirtualTime;
use devsim_engine::DevicePipeline;
use devsim_transport::RecordingTransport;

fn config(data: &Path) -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.device.id = "device-7".into();
    config.device.seed = Some(42);
    config.clock.interval = 10;
    config.data.path = data.join("device.json");
    config.data.save_interval = 50;
    config.data.max_messages = 100;
    config.mqtt.interval = 25;
    config
}

fn stored(path: &Path) -> Vec<SensorReading> {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn readings_flow_from_clock_to_broker() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let transport = RecordingTransport::new();
    let mut pipeline = DevicePipeline::new(&config, transport.clone()).unwrap();

    assert!(pipeline.start().await);
    assert!(!pipeline.start().await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    pipeline.stop().await;

    let produced = pipeline.metrics().readings.get() as usize;
    let published = transport.published();
    assert!(produced > 0);
    assert_eq!(published.len(), produced);
    assert!(pipeline.buffer().is_empty());

    let readings: Vec<SensorReading> = published
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).unwrap())
        .collect();
    assert!(readings.iter().all(|r| r.device_id == "device-7"));
    assert!(readings
        .windows(2)
        .all(|pair| pair[0].collected_at < pair[1].collected_at));

    // The final snapshot reflects the drained buffer.
    assert!(stored(&config.data.path).is_empty());
}

#[tokio::test]
async fn restored_readings_are_delivered_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    // Keep the clock quiet so only restored readings are in play.
    config.clock.interval = 3_600_000;

    let restored: Vec<SensorReading> = (1..=3)
        .map(|seq| SensorReading {
            device_id: "device-7".into(),
            door: DoorState::default(),
            temperature: 4.0,
            humidity: 60.0 + seq as f64,
            collected_at: DateTime::from_timestamp_millis(seq * 1_000).unwrap(),
        })
        .collect();
    std::fs::write(&config.data.path, serde_json::to_vec(&restored).unwrap()).unwrap();

    let transport = RecordingTransport::new();
    let mut pipeline = DevicePipeline::with_time(
        &config,
        transport.clone(),
        VirtualTime::starting_at(DateTime::from_timestamp_millis(1_000_000).unwrap()),
    )
    .unwrap();
    pipeline.start().await;
    pipeline.stop().await;

    let delivered: Vec<SensorReading> = transport
        .published()
        .iter()
        .map(|m| serde_json::from_slice(&m.payload).unwrap())
        .collect();
    assert_eq!(delivered, restored);
    assert!(stored(&config.data.path).is_empty());
}

#[tokio::test]
async fn offline_device_keeps_readings_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let transport = RecordingTransport::new();
    transport.fail_next_connects(usize::MAX);
    let mut pipeline = DevicePipeline::new(&config, transport.clone()).unwrap();

    pipeline.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    pipeline.stop().await;

    let pending = pipeline.buffer().len();
    assert!(pending > 0);
    assert!(transport.published().is_empty());
    assert_eq!(stored(&config.data.path).len(), pending);
}

#[tokio::test]
async fn unreadable_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.clock.interval = 3_600_000;
    std::fs::write(&config.data.path, b"not json").unwrap();

    let transport = RecordingTransport::new();
    let mut pipeline = DevicePipeline::new(&config, transport.clone()).unwrap();
    pipeline.start().await;
    assert!(pipeline.buffer().is_empty());
    pipeline.stop().await;

    assert!(transport.published().is_empty());
}

#[tokio::test]
async fn restart_does_not_restore_the_snapshot_twice() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.clock.interval = 3_600_000;

    let snapshot: Vec<SensorReading> = (1..=2)
        .map(|seq| SensorReading {
            device_id: "device-7".into(),
            door: DoorState::default(),
            temperature: 4.0,
            humidity: 60.0,
            collected_at: DateTime::from_timestamp_millis(seq * 1_000).unwrap(),
        })
        .collect();
    std::fs::write(&config.data.path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

    let transport = RecordingTransport::new();
    transport.fail_next_connects(usize::MAX);
    let mut pipeline = DevicePipeline::with_time(
        &config,
        transport.clone(),
        VirtualTime::starting_at(DateTime::from_timestamp_millis(1_000_000).unwrap()),
    )
    .unwrap();

    assert!(pipeline.start().await);
    pipeline.stop().await;
    assert_eq!(pipeline.buffer().len(), 2);

    assert!(pipeline.start().await);
    pipeline.stop().await;

    assert_eq!(pipeline.buffer().len(), 2);
    assert_eq!(stored(&config.data.path), snapshot);
    assert!(transport.published().is_empty());
}
