//! A complete simulated device: clock → sensor feed → telemetry buffer, with the
//! autosave and delivery services working the same buffer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use devsim_config::DeviceConfig;
use devsim_core::time::VirtualTime;
use devsim_core::TelemetryBuffer;
use devsim_simulator::{SensorFeed, SensorSimulator, Tick, VirtualClock};
use devsim_telemetry::MetricsRecorder;
use devsim_transport::Transport;

use crate::autosave::Autosave;
use crate::delivery::{DeliveryLoop, DeliverySettings};
use crate::error::PipelineError;
use crate::persistence::SnapshotStore;

pub struct DevicePipeline<T> {
    device_id: String,
    buffer: Arc<TelemetryBuffer>,
    store: Arc<SnapshotStore>,
    metrics: MetricsRecorder,
    feed: Arc<Mutex<SensorFeed>>,
    clock: VirtualClock,
    autosave: Autosave,
    delivery: DeliveryLoop<T>,
    restored: bool,
}

impl<T: Transport + 'static> DevicePipeline<T> {
    /// Wires every component from a validated configuration.
    pub fn new(config: &DeviceConfig, transport: T) -> Result<Self, PipelineError> {
        Self::with_time(config, transport, VirtualTime::starting_now())
    }

    /// Like [`DevicePipeline::new`], with virtual time starting at a chosen instant.
    pub fn with_time(
        config: &DeviceConfig,
        transport: T,
        time: VirtualTime,
    ) -> Result<Self, PipelineError> {
        let metrics = MetricsRecorder::new()?;
        let settings = DeliverySettings::from_config(&config.mqtt)?;
        let buffer = Arc::new(TelemetryBuffer::with_capacity(config.data.max_messages));
        let store = Arc::new(SnapshotStore::new(&config.data.path));

        let simulator = SensorSimulator::new(
            config.device.id.clone(),
            config.sensors.clone(),
            config.device.seed,
        );
        let feed = SensorFeed::new(simulator, Arc::clone(&buffer), metrics.clone());

        Ok(Self {
            device_id: config.device.id.clone(),
            clock: VirtualClock::new(&config.clock, time),
            autosave: Autosave::new(
                Arc::clone(&store),
                Arc::clone(&buffer),
                metrics.clone(),
                config.data.save_every(),
            ),
            delivery: DeliveryLoop::new(transport, Arc::clone(&buffer), settings, metrics.clone()),
            feed: Arc::new(Mutex::new(feed)),
            buffer,
            store,
            metrics,
            restored: false,
        })
    }

    pub fn buffer(&self) -> &Arc<TelemetryBuffer> {
        &self.buffer
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn delivery(&self) -> &DeliveryLoop<T> {
        &self.delivery
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Restores the last snapshot on the first start, then starts autosave, the
    /// clock and delivery. Returns `false` if the pipeline was already running.
    pub async fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        info!(device = %self.device_id, "Starting device pipeline");

        // The buffer outlives a stop, so a later start must not restore on top of it.
        if !self.restored {
            self.restored = true;
            match self.store.restore_into(&self.buffer).await {
                Ok(_) => self.metrics.set_buffer_depth(self.buffer.len()),
                Err(error) => warn!(
                    %error,
                    path = %self.store.path().display(),
                    "Snapshot restore failed, starting with an empty buffer"
                ),
            }
        }

        self.autosave.start();
        let feed = Arc::clone(&self.feed);
        self.clock.start(move |now: DateTime<Utc>| feed.lock().on_tick(now));
        self.delivery.start();
        true
    }

    /// Stops the clock first so no new readings arrive, then the delivery loop
    /// (final drain), then autosave (final snapshot of what is left).
    pub async fn stop(&mut self) {
        info!(device = %self.device_id, "Stopping device pipeline");
        self.clock.stop().await;
        self.delivery.stop().await;
        self.autosave.stop().await;
        info!(
            device = %self.device_id,
            pending = self.buffer.len(),
            "Device pipeline stopped"
        );
    }
}
