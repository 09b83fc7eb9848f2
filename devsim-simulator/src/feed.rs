//! Production tick step: simulate one reading and queue it for delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, trace, warn};

use devsim_core::TelemetryBuffer;
use devsim_telemetry::MetricsRecorder;

use crate::sensor::SensorSimulator;
use crate::virtual_clock::Tick;

pub struct SensorFeed {
    simulator: SensorSimulator,
    buffer: Arc<TelemetryBuffer>,
    metrics: MetricsRecorder,
    evicting: bool,
}

impl SensorFeed {
    pub fn new(
        simulator: SensorSimulator,
        buffer: Arc<TelemetryBuffer>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            simulator,
            buffer,
            metrics,
            evicting: false,
        }
    }
}

impl Tick for SensorFeed {
    fn on_tick(&mut self, now: DateTime<Utc>) {
        let reading = self.simulator.step(now);
        trace!(
            at = %now,
            door_open = reading.door.is_open,
            temperature = reading.temperature,
            humidity = reading.humidity,
            "Simulated reading"
        );
        let evicted = self.buffer.append(reading);
        self.metrics.readings.inc();
        self.metrics.set_buffer_depth(self.buffer.len());

        // Report the start and end of an overflow stretch, not every dropped reading.
        match evicted {
            Some(oldest) => {
                self.metrics.evicted.inc();
                if !self.evicting {
                    warn!(
                        capacity = self.buffer.capacity(),
                        oldest = %oldest.collected_at,
                        "Telemetry buffer full, evicting oldest readings"
                    );
                    self.evicting = true;
                }
            }
            None if self.evicting => {
                info!("Telemetry buffer below capacity again");
                self.evicting = false;
            }
            None => {}
        }
    }
}
