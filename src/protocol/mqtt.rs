//! MQTT transport on top of `rumqttc`.
//!
//! A background thread drives the `rumqttc` connection, delivers incoming
//! publishes to matching subscriptions and restores topic subscriptions
//! after every (re)connect.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, Transport};
use tracing::{debug, info, warn};

use super::{
    Address, CancellationToken, CompletionHandler, Protocol, ProtocolClient, ProtocolMessage,
    Subscription, SubscriptionRegistry, topic_matches, wrong_message, wrong_subscription,
};
use crate::payload::Payload;
use crate::utils::{BrokerError, Result};

const REQUEST_CAPACITY: usize = 64;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// TLS material read from the credential files.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub ca: Vec<u8>,
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

/// Connection parameters of an MQTT target.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub region: String,
    pub keep_alive: Duration,
    pub tls: Option<TlsMaterial>,
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some(tls) = &self.tls {
            options.set_transport(Transport::tls(
                tls.ca.clone(),
                tls.client_auth.clone(),
                None,
            ));
        }
        options
    }
}

struct Session {
    client: Client,
    running: Arc<AtomicBool>,
}

impl Session {
    fn open(settings: &MqttSettings, registry: Arc<SubscriptionRegistry>) -> Result<Self> {
        let (client, connection) = Client::new(settings.options(), REQUEST_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let loop_client = client.clone();
        thread::Builder::new()
            .name(format!("mqtt-{}", settings.client_id))
            .spawn(move || event_loop(connection, loop_client, registry, flag))?;
        info!(
            "mqtt session opened to {}:{} as {} ({})",
            settings.host, settings.port, settings.client_id, settings.region
        );
        Ok(Self { client, running })
    }

    fn close(&self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.client.try_disconnect() {
            debug!("mqtt disconnect: {e}");
        }
    }
}

fn subscribed_topics(registry: &SubscriptionRegistry) -> HashSet<String> {
    registry
        .subscriptions()
        .into_iter()
        .filter_map(|(_, s)| match s {
            Subscription::Mqtt { topic } => Some(topic),
            _ => None,
        })
        .collect()
}

fn event_loop(
    mut connection: Connection,
    client: Client,
    registry: Arc<SubscriptionRegistry>,
    running: Arc<AtomicBool>,
) {
    for notification in connection.iter() {
        if !running.load(Ordering::Acquire) {
            break;
        }
        match notification {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = Arc::new(Payload::from_bytes(publish.payload.to_vec()));
                let topic = publish.topic;
                let report = registry.invoke_on_message_received(&payload, |s| {
                    matches!(s, Subscription::Mqtt { topic: filter } if topic_matches(filter, &topic))
                });
                debug!(
                    "mqtt '{topic}': delivered to {}, {} failed",
                    report.delivered, report.failed
                );
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                for topic in subscribed_topics(&registry) {
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                        warn!("mqtt resubscribe to '{topic}' failed: {e}");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                warn!("mqtt connection error: {e}");
                thread::sleep(RETRY_DELAY);
            }
        }
    }
    debug!("mqtt event loop exited");
}

/// MQTT publisher/subscriber.
pub struct MqttClient {
    settings: MqttSettings,
    registry: Arc<SubscriptionRegistry>,
    session: Mutex<Session>,
}

impl MqttClient {
    pub fn connect(settings: MqttSettings) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let session = Session::open(&settings, registry.clone())?;
        Ok(Self {
            settings,
            registry,
            session: Mutex::new(session),
        })
    }

    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn client(&self) -> Client {
        self.session().client.clone()
    }
}

fn topic_of(message: &ProtocolMessage) -> Result<&str> {
    match message.address() {
        Address::Mqtt(addr) => Ok(&addr.topic),
        _ => Err(wrong_message(Protocol::Mqtt, message)),
    }
}

impl ProtocolClient for MqttClient {
    fn protocol(&self) -> Protocol {
        Protocol::Mqtt
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn check_subscription(&self, subscription: &Subscription) -> Result<()> {
        match subscription {
            Subscription::Mqtt { topic } if topic.is_empty() => {
                Err(BrokerError::invalid("mqtt topic is empty"))
            }
            Subscription::Mqtt { .. } => Ok(()),
            other => Err(wrong_subscription(Protocol::Mqtt, other)),
        }
    }

    fn on_subscription(&self, _token: CancellationToken, subscription: &Subscription) -> Result<()> {
        let Subscription::Mqtt { topic } = subscription else {
            return Err(wrong_subscription(Protocol::Mqtt, subscription));
        };
        self.client()
            .try_subscribe(topic.clone(), QoS::AtLeastOnce)
            .map_err(|e| BrokerError::transport(format!("mqtt subscribe '{topic}': {e}")))
    }

    fn on_unsubscribe(&self, token: CancellationToken, subscription: &Subscription) -> Result<()> {
        let Subscription::Mqtt { topic } = subscription else {
            return Ok(());
        };
        let shared = self
            .registry
            .subscriptions()
            .into_iter()
            .any(|(other, s)| other != token && s == *subscription);
        if shared {
            return Ok(());
        }
        self.client()
            .try_unsubscribe(topic.clone())
            .map_err(|e| BrokerError::transport(format!("mqtt unsubscribe '{topic}': {e}")))
    }

    /// Hands the message to the connection without waiting; fails when the
    /// request queue is full, e.g. while the endpoint is unreachable.
    fn publish(&self, message: &ProtocolMessage) -> Result<()> {
        let topic = topic_of(message)?;
        self.client()
            .try_publish(
                topic,
                QoS::AtLeastOnce,
                false,
                message.payload().serialize().into_owned(),
            )
            .map_err(|e| BrokerError::transport(format!("mqtt publish '{topic}': {e}")))
    }

    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler) {
        let result = topic_of(&message).and_then(|topic| {
            self.client()
                .try_publish(
                    topic,
                    QoS::AtLeastOnce,
                    false,
                    message.payload().serialize().into_owned(),
                )
                .map_err(|e| BrokerError::transport(format!("mqtt publish '{topic}': {e}")))
        });
        if let Err(e) = &result {
            warn!("{e}");
        }
        handler(Protocol::Mqtt.as_str(), &message, result.is_ok());
    }

    /// Opens a fresh session; subscriptions are restored once it connects.
    fn reconnect(&self) -> Result<()> {
        let mut session = self.session();
        session.close();
        *session = Session::open(&self.settings, self.registry.clone())?;
        Ok(())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        self.unsubscribe_all();
        self.session().close();
    }
}
