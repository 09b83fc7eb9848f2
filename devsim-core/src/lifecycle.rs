//! Start/stop lifecycle shared by the clock, autosave and delivery services.
//!
//! A [`Worker`] owns one spawned task. The task receives a [`StopSignal`] it checks
//! between iterations; [`Worker::stop`] raises the signal and then waits for the
//! task to finish, so the caller knows the loop has really exited.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Running,
    StopRequested,
}

/// Cooperative cancellation handed to a worker's task.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// A dropped [`Worker`] counts as a stop request.
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once a stop has been requested.
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }

    /// Sleeps for `duration`. Returns `false` if a stop request cut the sleep short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_requested() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.requested() => false,
        }
    }
}

pub struct Worker {
    name: &'static str,
    state: Arc<Mutex<LifecycleState>>,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(LifecycleState::Stopped)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() != LifecycleState::Stopped
    }

    /// Spawns `body` on the current tokio runtime. Returns `false` without doing
    /// anything if the worker is already running.
    pub fn start<F, Fut>(&mut self, body: F) -> bool
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Stopped {
                debug!(worker = self.name, "Already running");
                return false;
            }
            *state = LifecycleState::Running;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = body(StopSignal { rx: stop_rx });
        let state = Arc::clone(&self.state);
        let name = self.name;

        self.handle = Some(tokio::spawn(async move {
            info!(worker = name, "Started");
            task.await;
            *state.lock() = LifecycleState::Stopped;
            info!(worker = name, "Stopped");
        }));
        self.stop_tx = Some(stop_tx);
        true
    }

    /// Requests a stop and waits for the task to acknowledge it by returning.
    /// A no-op when not running.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        {
            let mut state = self.state.lock();
            if *state == LifecycleState::Running {
                *state = LifecycleState::StopRequested;
                info!(worker = self.name, "Stop requested, waiting");
            }
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }

        if let Err(join_error) = handle.await {
            error!(worker = self.name, error = %join_error, "Task ended abnormally");
            *self.state.lock() = LifecycleState::Stopped;
        }
    }
}
