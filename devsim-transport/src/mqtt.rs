//! MQTT transport on top of `rumqttc`.
//!
//! The rumqttc event loop runs on its own task and forwards the packets the
//! transport cares about (CONNACK, acknowledgements, connection loss) over a
//! channel. Each trait operation submits its request through the client and then
//! waits, bounded by a timeout, for the matching broker event.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use devsim_config::{Credentials, MqttConfig, TlsConfig};
use devsim_core::TransportError;

use crate::{Qos, Transport};

const REQUEST_CAPACITY: usize = 16;
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
            Qos::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// Broker events relayed from the event loop task.
#[derive(Debug)]
enum BrokerEvent {
    Connected,
    Refused(String),
    PublishSent,
    PubAck,
    PubComp,
    SubAck,
    UnsubAck,
    Lost(String),
}

struct Session {
    client: AsyncClient,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
    task: JoinHandle<()>,
}

impl Session {
    /// Drops events left over from an earlier operation that timed out.
    fn discard_stale(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    async fn wait_for(
        &mut self,
        wanted: fn(&BrokerEvent) -> bool,
        operation: &'static str,
        after: Duration,
    ) -> Result<(), TransportError> {
        let events = &mut self.events;
        let outcome = tokio::time::timeout(after, async {
            loop {
                match events.recv().await {
                    Some(event) if wanted(&event) => return Ok(()),
                    Some(BrokerEvent::Lost(reason)) | Some(BrokerEvent::Refused(reason)) => {
                        return Err(TransportError::ConnectionLost(reason))
                    }
                    Some(_) => continue,
                    None => {
                        return Err(TransportError::ConnectionLost("event loop ended".into()))
                    }
                }
            }
        })
        .await;

        outcome.unwrap_or(Err(TransportError::Timeout { operation, after }))
    }
}

pub struct MqttTransport {
    broker: String,
    host: String,
    port: u16,
    client_id: String,
    keep_alive: Duration,
    credentials: Option<Credentials>,
    tls: TlsConfig,
    connect_timeout: Duration,
    ack_timeout: Duration,
    connected: Arc<AtomicBool>,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(config: &MqttConfig, client_id: impl Into<String>) -> Self {
        let scheme = if config.tls.enabled { "mqtts" } else { "mqtt" };
        Self {
            broker: format!("{scheme}://{}:{}", config.host, config.port),
            host: config.host.clone(),
            port: config.port,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(config.keep_alive),
            credentials: config.authentication.clone(),
            tls: config.tls.clone(),
            connect_timeout: config.connect_wait(),
            ack_timeout: config.ack_wait(),
            connected: Arc::new(AtomicBool::new(false)),
            session: None,
        }
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    async fn options(&self) -> Result<MqttOptions, TransportError> {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some(credentials) = &self.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }

        if self.tls.enabled {
            let ca = read_pem(&self.tls.ca).await?;
            let client_auth = match (&self.tls.cert, &self.tls.key) {
                (Some(cert), Some(key)) => Some((read_pem(cert).await?, read_pem(key).await?)),
                _ => None,
            };
            options.set_transport(rumqttc::Transport::tls_with_config(
                TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth,
                },
            ));
        }

        Ok(options)
    }

    fn live_session(&mut self) -> Result<&mut Session, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.session.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Tears down a session whose connection was lost without a disconnect.
    fn discard_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| TransportError::Tls {
            path: path.to_path_buf(),
            source,
        })
}

/// Polls the rumqttc event loop until the connection ends. Reconnection is left
/// to the delivery loop, so the task exits on the first connection error.
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<BrokerEvent>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let relay = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::SeqCst);
                    BrokerEvent::Connected
                } else {
                    let _ = events.send(BrokerEvent::Refused(format!("{:?}", ack.code)));
                    break;
                }
            }
            Ok(Event::Incoming(Packet::PubAck(_))) => BrokerEvent::PubAck,
            Ok(Event::Incoming(Packet::PubComp(_))) => BrokerEvent::PubComp,
            Ok(Event::Incoming(Packet::SubAck(_))) => BrokerEvent::SubAck,
            Ok(Event::Incoming(Packet::UnsubAck(_))) => BrokerEvent::UnsubAck,
            Ok(Event::Incoming(Packet::Publish(message))) => {
                info!(
                    topic = %message.topic,
                    bytes = message.payload.len(),
                    "Control message received"
                );
                continue;
            }
            Ok(Event::Outgoing(Outgoing::Publish(_))) => BrokerEvent::PublishSent,
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                continue;
            }
            Ok(_) => continue,
            Err(error) => {
                let was_connected = connected.swap(false, Ordering::SeqCst);
                if was_connected {
                    warn!(%error, "Broker connection lost");
                }
                let _ = events.send(BrokerEvent::Lost(error.to_string()));
                break;
            }
        };

        if events.send(relay).is_err() {
            break;
        }
    }
    debug!("MQTT event loop finished");
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        self.discard_session();

        let options = self.options().await?;
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(drive(eventloop, events_tx, Arc::clone(&self.connected)));
        let mut session = Session {
            client,
            events,
            task,
        };

        info!(broker = %self.broker, client_id = %self.client_id, "Connecting");
        let outcome = tokio::time::timeout(self.connect_timeout, session.events.recv()).await;
        let failure = match outcome {
            Ok(Some(BrokerEvent::Connected)) => {
                info!(broker = %self.broker, "Connected");
                self.session = Some(session);
                return Ok(());
            }
            Ok(Some(BrokerEvent::Refused(reason))) | Ok(Some(BrokerEvent::Lost(reason))) => {
                TransportError::Connect {
                    broker: self.broker.clone(),
                    reason,
                }
            }
            Ok(Some(other)) => TransportError::Connect {
                broker: self.broker.clone(),
                reason: format!("unexpected {other:?} before CONNACK"),
            },
            Ok(None) => TransportError::Connect {
                broker: self.broker.clone(),
                reason: "event loop ended".into(),
            },
            Err(_) => TransportError::Timeout {
                operation: "CONNACK",
                after: self.connect_timeout,
            },
        };

        session.task.abort();
        self.connected.store(false, Ordering::SeqCst);
        Err(failure)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if self.connected.load(Ordering::SeqCst) {
            if let Err(error) = session.client.disconnect().await {
                debug!(%error, "Disconnect request not delivered");
            }
            let mut task = session.task;
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        } else {
            session.task.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        info!(broker = %self.broker, "Disconnected");
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
    ) -> Result<(), TransportError> {
        let ack_timeout = self.ack_timeout;
        let session = self.live_session()?;
        session.discard_stale();

        session
            .client
            .publish_bytes(topic, qos.into(), false, payload)
            .await
            .map_err(|error| TransportError::Publish {
                topic: topic.to_string(),
                reason: error.to_string(),
            })?;

        let outcome = match qos {
            Qos::AtMostOnce => {
                session
                    .wait_for(
                        |event| matches!(event, BrokerEvent::PublishSent),
                        "publish",
                        ack_timeout,
                    )
                    .await
            }
            Qos::AtLeastOnce => {
                session
                    .wait_for(
                        |event| matches!(event, BrokerEvent::PubAck),
                        "PUBACK",
                        ack_timeout,
                    )
                    .await
            }
            Qos::ExactlyOnce => {
                session
                    .wait_for(
                        |event| matches!(event, BrokerEvent::PubComp),
                        "PUBCOMP",
                        ack_timeout,
                    )
                    .await
            }
        };

        if let Err(TransportError::ConnectionLost(_)) = &outcome {
            self.discard_session();
        }
        outcome
    }

    async fn subscribe(&mut self, topic: &str, qos: Qos) -> Result<(), TransportError> {
        let ack_timeout = self.ack_timeout;
        let session = self.live_session()?;
        session.discard_stale();

        session
            .client
            .subscribe(topic, qos.into())
            .await
            .map_err(|error| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: error.to_string(),
            })?;

        session
            .wait_for(
                |event| matches!(event, BrokerEvent::SubAck),
                "SUBACK",
                ack_timeout,
            )
            .await?;
        debug!(topic, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let ack_timeout = self.ack_timeout;
        let session = self.live_session()?;
        session.discard_stale();

        session
            .client
            .unsubscribe(topic)
            .await
            .map_err(|error| TransportError::Unsubscribe {
                topic: topic.to_string(),
                reason: error.to_string(),
            })?;

        session
            .wait_for(
                |event| matches!(event, BrokerEvent::UnsubAck),
                "UNSUBACK",
                ack_timeout,
            )
            .await?;
        debug!(topic, "Unsubscribed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some() && self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn config_for(port: u16) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout: 2_000,
            ..MqttConfig::default()
        }
    }

    /// A port nothing listens on.
    fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn operations_require_a_connection() {
        let mut transport = MqttTransport::new(&MqttConfig::default(), "test-client");
        assert!(!transport.is_connected());

        let published = transport
            .publish("devices/telemetry", Bytes::from_static(b"{}"), Qos::AtLeastOnce)
            .await;
        assert!(matches!(published, Err(TransportError::NotConnected)));

        let subscribed = transport.subscribe("devices/commands", Qos::AtMostOnce).await;
        assert!(matches!(subscribed, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_noop() {
        let mut transport = MqttTransport::new(&MqttConfig::default(), "test-client");
        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn refused_connection_is_reported() {
        let mut transport = MqttTransport::new(&config_for(closed_port()), "test-client");
        let result = transport.connect().await;

        assert!(matches!(result, Err(TransportError::Connect { .. })));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn missing_tls_material_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(closed_port());
        config.tls = TlsConfig {
            enabled: true,
            ca: dir.path().join("missing-ca.pem"),
            cert: None,
            key: None,
        };

        let mut transport = MqttTransport::new(&config, "test-client");
        assert!(transport.broker().starts_with("mqtts://"));
        match transport.connect().await {
            Err(TransportError::Tls { path, .. }) => assert!(path.ends_with("missing-ca.pem")),
            other => panic!("expected a TLS error, got {other:?}"),
        }
    }
}
