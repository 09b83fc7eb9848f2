//! Broker connection parameters.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// MQTT broker, topics and delivery cadence.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[validate(schema(function = validation::validate_subscription))]
#[serde(default)]
pub struct MqttConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    /// Client identifier; `devsim-<device id>` when absent.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Milliseconds between delivery cycles.
    #[serde(default = "default_interval")]
    #[validate(range(min = 1))]
    pub interval: u64,

    /// Keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    #[validate(range(min = 5, max = 65_535))]
    pub keep_alive: u64,

    /// Milliseconds to wait for CONNACK.
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    pub connect_timeout: u64,

    /// Milliseconds to wait for a publish / subscribe acknowledgement.
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    pub ack_timeout: u64,

    /// Upper bound for the final drain performed on shutdown (ms).
    #[serde(default = "default_shutdown_timeout")]
    #[validate(range(min = 1))]
    pub shutdown_timeout: u64,

    #[serde(default)]
    #[validate(nested)]
    pub publish: PublishTopic,

    #[serde(default)]
    #[validate(nested)]
    pub subscribe: SubscribeTopic,

    /// Broker login; anonymous when absent.
    #[serde(default)]
    #[validate(nested)]
    pub authentication: Option<Credentials>,

    #[serde(default)]
    #[validate(nested)]
    pub tls: TlsConfig,
}

fn default_interval() -> u64 {
    1_000
}

fn default_keep_alive() -> u64 {
    30
}

fn default_timeout() -> u64 {
    5_000
}

fn default_shutdown_timeout() -> u64 {
    10_000
}

impl MqttConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }

    pub fn connect_wait(&self) -> Duration {
        Duration::from_millis(self.connect_timeout)
    }

    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_timeout)
    }

    pub fn shutdown_wait(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: None,
            interval: default_interval(),
            keep_alive: default_keep_alive(),
            connect_timeout: default_timeout(),
            ack_timeout: default_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            publish: PublishTopic::default(),
            subscribe: SubscribeTopic::default(),
            authentication: None,
            tls: TlsConfig::default(),
        }
    }
}

/// Topic readings are published to.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct PublishTopic {
    #[validate(custom(function = validation::validate_publish_topic))]
    pub topic: String,

    #[validate(custom(function = validation::validate_qos))]
    pub qos: u8,
}

impl Default for PublishTopic {
    fn default() -> Self {
        Self {
            topic: "devices/telemetry".into(),
            qos: 2,
        }
    }
}

/// Control topic subscribed to on every delivery cycle.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct SubscribeTopic {
    #[serde(default)]
    pub enabled: bool,

    pub topic: String,

    #[validate(custom(function = validation::validate_qos))]
    pub qos: u8,

    /// Drop the subscription during the final shutdown drain.
    #[serde(default)]
    pub unsubscribe_on_shutdown: bool,
}

impl Default for SubscribeTopic {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: "devices/commands".into(),
            qos: 1,
            unsubscribe_on_shutdown: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct Credentials {
    #[validate(length(min = 1))]
    pub username: String,

    #[validate(length(min = 1))]
    pub password: String,
}

/// TLS material, PEM encoded.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Default)]
#[validate(schema(function = validation::validate_tls))]
#[serde(default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// CA certificate used to verify the broker.
    #[serde(default, alias = "root")]
    pub ca: PathBuf,

    /// Client certificate for mutual TLS.
    #[serde(default, alias = "crt")]
    pub cert: Option<PathBuf>,

    /// Client private key for mutual TLS.
    #[serde(default)]
    pub key: Option<PathBuf>,
}
