//! ## devsim-telemetry::metrics
//! **Prometheus counters for the buffering pipeline**

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("metrics registry error: {0}")]
pub struct MetricsError(#[from] prometheus::Error);

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub readings: IntCounter,
    pub evicted: IntCounter,
    pub published: IntCounter,
    pub publish_failures: IntCounter,
    pub snapshots_written: IntCounter,
    pub buffer_depth: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let readings = IntCounter::new("devsim_readings_total", "Simulated sensor readings")?;
        let evicted = IntCounter::new(
            "devsim_readings_evicted_total",
            "Readings dropped because the buffer was full",
        )?;
        let published = IntCounter::new(
            "devsim_messages_published_total",
            "Readings confirmed by the broker",
        )?;
        let publish_failures = IntCounter::new(
            "devsim_publish_failures_total",
            "Delivery cycles stopped by a transport failure",
        )?;
        let snapshots_written = IntCounter::new(
            "devsim_snapshots_written_total",
            "Buffer snapshots persisted to disk",
        )?;
        let buffer_depth = IntGauge::new("devsim_buffer_depth", "Readings waiting for delivery")?;

        registry.register(Box::new(readings.clone()))?;
        registry.register(Box::new(evicted.clone()))?;
        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(publish_failures.clone()))?;
        registry.register(Box::new(snapshots_written.clone()))?;
        registry.register(Box::new(buffer_depth.clone()))?;

        Ok(Self {
            registry,
            readings,
            evicted,
            published,
            publish_failures,
            snapshots_written,
            buffer_depth,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, MetricsError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn set_buffer_depth(&self, depth: usize) {
        self.buffer_depth.set(depth as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_counters() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.readings.inc();
        metrics.published.inc_by(3);
        metrics.set_buffer_depth(7);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("devsim_readings_total 1"));
        assert!(text.contains("devsim_messages_published_total 3"));
        assert!(text.contains("devsim_buffer_depth 7"));
    }
}
