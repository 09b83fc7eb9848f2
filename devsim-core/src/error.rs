use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Broker-side failures. None of them is fatal: the delivery loop logs them and
/// retries on its next cycle with the buffered data untouched.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Failed to connect to {broker}: {reason}")]
    Connect { broker: String, reason: String },

    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to unsubscribe from {topic}: {reason}")]
    Unsubscribe { topic: String, reason: String },

    #[error("Timed out waiting for {operation} after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Unsupported QoS level {0}")]
    UnsupportedQos(u8),

    #[error("Failed to load TLS material {path}: {source}")]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker connection lost: {0}")]
    ConnectionLost(String),
}

/// Snapshot encoding / decoding failures.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Malformed snapshot document: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Failed to encode reading: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Stable storage failures. Logged as warnings; the buffer keeps running in memory.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}
