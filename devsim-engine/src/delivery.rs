//! # Delivery Loop
//!
//! Consumer side of the pipeline. Every `interval` it connects (when there is
//! something to send), publishes readings oldest first and removes each one only
//! after the broker confirmed it, then disconnects. The first failure ends the
//! cycle with the unsent readings still buffered; the next cycle retries them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use devsim_config::MqttConfig;
use devsim_core::lifecycle::{LifecycleState, Worker};
use devsim_core::{TelemetryBuffer, TransportError};
use devsim_telemetry::logging::EventLogger;
use devsim_telemetry::MetricsRecorder;
use devsim_transport::{Qos, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: Qos,
    pub unsubscribe_on_shutdown: bool,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub topic: String,
    pub qos: Qos,
    pub subscription: Option<Subscription>,
    pub interval: Duration,
    /// Bound on the final drain performed when the loop stops.
    pub shutdown_timeout: Duration,
}

impl DeliverySettings {
    pub fn from_config(config: &MqttConfig) -> Result<Self, TransportError> {
        let subscription = if config.subscribe.enabled {
            Some(Subscription {
                topic: config.subscribe.topic.clone(),
                qos: Qos::try_from(config.subscribe.qos)?,
                unsubscribe_on_shutdown: config.subscribe.unsubscribe_on_shutdown,
            })
        } else {
            None
        };

        Ok(Self {
            topic: config.publish.topic.clone(),
            qos: Qos::try_from(config.publish.qos)?,
            subscription,
            interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_wait(),
        })
    }
}

/// What one delivery cycle achieved.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Readings confirmed by the broker and removed from the buffer.
    pub published: usize,
    /// The failure that ended the cycle early, if any.
    pub failed: Option<TransportError>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_none()
    }
}

struct Courier<T> {
    transport: T,
    buffer: Arc<TelemetryBuffer>,
    settings: DeliverySettings,
    metrics: MetricsRecorder,
}

impl<T: Transport> Courier<T> {
    #[instrument(name = "delivery_cycle", skip_all, fields(depth = self.buffer.len()))]
    async fn run_cycle(&mut self) -> CycleReport {
        if self.buffer.is_empty() {
            trace!("Nothing to deliver");
            return CycleReport::default();
        }

        let report = self.deliver(true).await;
        self.disconnect().await;
        report
    }

    /// Best-effort delivery of whatever is left when the loop stops.
    #[instrument(name = "final_drain", skip_all, fields(depth = self.buffer.len()))]
    async fn final_drain(&mut self) -> CycleReport {
        let drained = !self.buffer.is_empty();
        let report = if drained {
            self.deliver(false).await
        } else {
            CycleReport::default()
        };

        if let Some(subscription) = &self.settings.subscription {
            // An empty buffer never opened a session, so open one just to unsubscribe.
            if subscription.unsubscribe_on_shutdown && !drained {
                if let Err(error) = self.transport.connect().await {
                    warn!(%error, "Broker unavailable, skipping unsubscribe");
                }
            }
            if subscription.unsubscribe_on_shutdown && self.transport.is_connected() {
                match self.transport.unsubscribe(&subscription.topic).await {
                    Ok(()) => info!(topic = %subscription.topic, "Unsubscribed from control topic"),
                    Err(error) => warn!(%error, "Unsubscribe failed"),
                }
            }
        }

        self.disconnect().await;
        report
    }

    /// Connects, optionally subscribes and drains. Leaves the connection open.
    async fn deliver(&mut self, subscribe: bool) -> CycleReport {
        let mut report = CycleReport::default();

        if let Err(error) = self.transport.connect().await {
            warn!(%error, pending = self.buffer.len(), "Broker unavailable, keeping readings buffered");
            self.metrics.publish_failures.inc();
            report.failed = Some(error);
            return report;
        }

        if subscribe {
            if let Some(subscription) = &self.settings.subscription {
                if let Err(error) = self
                    .transport
                    .subscribe(&subscription.topic, subscription.qos)
                    .await
                {
                    warn!(%error, "Control topic subscription failed");
                }
            }
        }

        if let Err(error) = self.drain(&mut report).await {
            warn!(
                %error,
                published = report.published,
                pending = self.buffer.len(),
                "Publish failed, retrying next cycle"
            );
            self.metrics.publish_failures.inc();
            report.failed = Some(error);
        }
        report
    }

    async fn drain(&mut self, report: &mut CycleReport) -> Result<(), TransportError> {
        while let Some(reading) = self.buffer.peek_head() {
            let payload = match reading.to_payload() {
                Ok(payload) => payload,
                Err(error) => {
                    error!(%error, collected_at = %reading.collected_at, "Dropping reading that cannot be encoded");
                    self.buffer.remove_delivered(&reading);
                    continue;
                }
            };

            self.transport
                .publish(&self.settings.topic, payload, self.settings.qos)
                .await?;

            self.buffer.remove_delivered(&reading);
            report.published += 1;
            self.metrics.published.inc();
            self.metrics.set_buffer_depth(self.buffer.len());
            debug!(
                topic = %self.settings.topic,
                collected_at = %reading.collected_at,
                "Published reading"
            );
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Err(error) = self.transport.disconnect().await {
            warn!(%error, "Disconnect failed");
        }
    }
}

pub struct DeliveryLoop<T> {
    courier: Arc<Mutex<Courier<T>>>,
    interval: Duration,
    shutdown_timeout: Duration,
    worker: Worker,
}

impl<T: Transport + 'static> DeliveryLoop<T> {
    pub fn new(
        transport: T,
        buffer: Arc<TelemetryBuffer>,
        settings: DeliverySettings,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            interval: settings.interval,
            shutdown_timeout: settings.shutdown_timeout,
            courier: Arc::new(Mutex::new(Courier {
                transport,
                buffer,
                settings,
                metrics,
            })),
            worker: Worker::new("delivery"),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.worker.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Runs a single delivery cycle. Waits if the loop is in the middle of one.
    pub async fn run_cycle(&self) -> CycleReport {
        self.courier.lock().await.run_cycle().await
    }

    pub fn start(&mut self) -> bool {
        let courier = Arc::clone(&self.courier);
        let interval = self.interval;
        let shutdown_timeout = self.shutdown_timeout;

        self.worker.start(move |mut stop| async move {
            EventLogger::lifecycle("delivery", "polling");
            while stop.sleep(interval).await {
                courier.lock().await.run_cycle().await;
            }

            let mut courier = courier.lock().await;
            match tokio::time::timeout(shutdown_timeout, courier.final_drain()).await {
                Ok(report) => info!(
                    published = report.published,
                    pending = courier.buffer.len(),
                    "Final drain finished"
                ),
                Err(_) => {
                    warn!(
                        after = ?shutdown_timeout,
                        pending = courier.buffer.len(),
                        "Final drain timed out"
                    );
                    courier.disconnect().await;
                }
            }
        })
    }

    /// Stops polling, then waits for the final drain to finish.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}
