//! # Virtual Clock
//!
//! Drives simulated time on a fixed real-time cadence: every `interval` real
//! milliseconds virtual time moves forward by `interval * multiplier` milliseconds
//! and the tick step runs. Steps run one after another on the clock's own task and
//! never overlap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use devsim_config::ClockConfig;
use devsim_core::lifecycle::{LifecycleState, Worker};
use devsim_core::time::VirtualTime;

/// Work performed on every tick, with the new virtual instant.
pub trait Tick: Send + 'static {
    fn on_tick(&mut self, now: DateTime<Utc>);
}

impl<F> Tick for F
where
    F: FnMut(DateTime<Utc>) + Send + 'static,
{
    fn on_tick(&mut self, now: DateTime<Utc>) {
        self(now)
    }
}

pub struct VirtualClock {
    interval: Duration,
    step_ms: u64,
    time: VirtualTime,
    ticks: Arc<AtomicU64>,
    worker: Worker,
}

impl VirtualClock {
    pub fn new(config: &ClockConfig, time: VirtualTime) -> Self {
        Self {
            interval: config.tick_interval(),
            step_ms: config.virtual_step_ms(),
            time,
            ticks: Arc::new(AtomicU64::new(0)),
            worker: Worker::new("virtual_clock"),
        }
    }

    /// Shared handle on the virtual time this clock advances.
    pub fn time(&self) -> VirtualTime {
        self.time.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    /// Ticks completed since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LifecycleState {
        self.worker.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Starts ticking. Returns `false`, dropping `step`, if already running.
    pub fn start<T: Tick>(&mut self, mut step: T) -> bool {
        let interval = self.interval;
        let step_ms = self.step_ms;
        let time = self.time.clone();
        let ticks = Arc::clone(&self.ticks);

        self.worker.start(move |mut stop| async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                step_ms,
                start = %time.now(),
                "Virtual clock running"
            );
            while stop.sleep(interval).await {
                let now = time.advance(step_ms);
                step.on_tick(now);
                ticks.fetch_add(1, Ordering::AcqRel);
            }
        })
    }

    /// Stops ticking and waits until the loop has exited. At most the tick that was
    /// already running completes.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn clock() -> VirtualClock {
        let config = ClockConfig {
            interval: 10,
            multiplier: 60,
        };
        let start = DateTime::from_timestamp_millis(0).unwrap();
        VirtualClock::new(&config, VirtualTime::starting_at(start))
    }

    #[tokio::test(start_paused = true)]
    async fn advances_by_interval_times_multiplier() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut clock = clock();

        let sink = Arc::clone(&seen);
        assert!(clock.start(move |now: DateTime<Utc>| {
            sink.lock().unwrap().push(now.timestamp_millis());
        }));

        tokio::time::sleep(Duration::from_millis(55)).await;
        clock.stop().await;

        assert_eq!(*seen.lock().unwrap(), vec![600, 1_200, 1_800, 2_400, 3_000]);
        assert_eq!(clock.ticks(), 5);
        assert_eq!(clock.now().timestamp_millis(), 3_000);
        assert_eq!(clock.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_after_stop() {
        let mut clock = clock();
        clock.start(|_now: DateTime<Utc>| {});
        tokio::time::sleep(Duration::from_millis(25)).await;
        clock.stop().await;

        let ticks = clock.ticks();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(clock.ticks(), ticks);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_noop() {
        let mut clock = clock();
        assert!(clock.start(|_now: DateTime<Utc>| {}));
        assert!(!clock.start(|_now: DateTime<Utc>| {
            panic!("second step must not run");
        }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        clock.stop().await;
        assert!(!clock.is_running());
    }
}
