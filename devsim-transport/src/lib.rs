//! # Device Transport
//!
//! The publish/subscribe capability the delivery loop sends readings through.
//!
//! Every operation reports success or failure explicitly and nothing is retried
//! behind the caller's back; retry timing belongs to the delivery loop.

use async_trait::async_trait;
use bytes::Bytes;

use devsim_core::TransportError;

pub mod fake;
pub mod mqtt;

pub use fake::{Published, RecordingTransport};
pub use mqtt::MqttTransport;

/// Delivery guarantee requested from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = TransportError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(TransportError::UnsupportedQos(other)),
        }
    }
}

#[async_trait]
pub trait Transport: Send {
    /// Opens the broker session. Succeeds immediately when already connected.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Closes the session. Succeeds immediately when not connected.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Returns once the broker has confirmed the message at the requested QoS.
    async fn publish(&mut self, topic: &str, payload: Bytes, qos: Qos)
        -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_from_level() {
        assert_eq!(Qos::try_from(0).unwrap(), Qos::AtMostOnce);
        assert_eq!(Qos::try_from(2).unwrap(), Qos::ExactlyOnce);
        assert!(matches!(
            Qos::try_from(3),
            Err(TransportError::UnsupportedQos(3))
        ));
    }
}
