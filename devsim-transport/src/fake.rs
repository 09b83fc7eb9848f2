//! Deterministic in-memory transport.
//!
//! Clones share one journal, so a test can keep a handle while the delivery loop
//! owns another and inspect exactly what was connected and published.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use devsim_core::TransportError;

use crate::{Qos, Transport};

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
    pub qos: Qos,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    connect_attempts: usize,
    disconnects: usize,
    publish_attempts: usize,
    published: Vec<Published>,
    subscriptions: Vec<String>,
    unsubscriptions: Vec<String>,
    // Scripted failures.
    failing_connects: usize,
    failing_publishes: HashSet<usize>,
    failing_subscribes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<State>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().failing_connects = count;
    }

    /// The `attempt`-th publish (1-based, counted over the transport's lifetime) fails.
    pub fn fail_publish_attempt(&self, attempt: usize) {
        self.state.lock().failing_publishes.insert(attempt);
    }

    /// Every subscribe fails.
    pub fn fail_subscribes(&self) {
        self.state.lock().failing_subscribes = true;
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn publish_attempts(&self) -> usize {
        self.state.lock().publish_attempts
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.state.lock().unsubscriptions.clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        state.connect_attempts += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connect {
                broker: "recording".into(),
                reason: "scripted failure".into(),
            });
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.publish_attempts += 1;
        let attempt = state.publish_attempts;
        if state.failing_publishes.contains(&attempt) {
            return Err(TransportError::Publish {
                topic: topic.into(),
                reason: format!("scripted failure on attempt {attempt}"),
            });
        }
        state.published.push(Published {
            topic: topic.into(),
            payload,
            qos,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, _qos: Qos) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.failing_subscribes {
            return Err(TransportError::Subscribe {
                topic: topic.into(),
                reason: "scripted failure".into(),
            });
        }
        state.subscriptions.push(topic.into());
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.unsubscriptions.push(topic.into());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}
