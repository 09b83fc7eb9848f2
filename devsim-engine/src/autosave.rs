//! Buffer service: periodically persists the telemetry buffer.
//!
//! Failed writes are logged and retried on the next interval; memory keeps
//! running either way. Stopping performs one last flush so the snapshot reflects
//! whatever the delivery loop managed to drain.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use devsim_core::lifecycle::{LifecycleState, Worker};
use devsim_core::TelemetryBuffer;
use devsim_telemetry::MetricsRecorder;

use crate::persistence::{FlushOutcome, SnapshotStore};

pub struct Autosave {
    store: Arc<SnapshotStore>,
    buffer: Arc<TelemetryBuffer>,
    metrics: MetricsRecorder,
    interval: Duration,
    worker: Worker,
}

impl Autosave {
    pub fn new(
        store: Arc<SnapshotStore>,
        buffer: Arc<TelemetryBuffer>,
        metrics: MetricsRecorder,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            buffer,
            metrics,
            interval,
            worker: Worker::new("autosave"),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.worker.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn start(&mut self) -> bool {
        let store = Arc::clone(&self.store);
        let buffer = Arc::clone(&self.buffer);
        let metrics = self.metrics.clone();
        let interval = self.interval;

        self.worker.start(move |mut stop| async move {
            while stop.sleep(interval).await {
                flush(&store, &buffer, &metrics).await;
            }
            flush(&store, &buffer, &metrics).await;
        })
    }

    /// Stops the timer and waits for the final flush.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}

async fn flush(store: &SnapshotStore, buffer: &TelemetryBuffer, metrics: &MetricsRecorder) {
    match store.flush(buffer).await {
        Ok(FlushOutcome::Written { readings }) => {
            metrics.snapshots_written.inc();
            info!(stored = readings, path = %store.path().display(), "Snapshot saved");
        }
        Ok(FlushOutcome::Clean) => debug!(stored = buffer.len(), "Buffer unchanged"),
        Err(error) => warn!(%error, "Snapshot failed, retrying next interval"),
    }
}
