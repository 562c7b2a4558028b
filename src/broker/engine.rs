use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::json;
use tracing::{debug, error, info, warn};

use super::pipe::{BrokerConfig, TargetConfig};
use crate::expansion::MacroExpander;
use crate::factory::{Credentials, ProtocolFactory, WorkerSizes, default_factories};
use crate::payload::Payload;
use crate::protocol::{
    CancellationToken, CompletionHandler, EventHandler, LoopbackClient, Protocol, ProtocolClient,
    ProtocolMessage, Subscription, UnsubscribeStatus,
};
use crate::utils::{BrokerError, Result};

/// Completion callback of [`MessageBroker::publish_async`], called once per
/// dispatched destination with `(protocol_name, message, success)`.
pub type PublishHandler = Arc<dyn Fn(&str, &ProtocolMessage, bool) + Send + Sync>;

struct Target {
    protocol: Protocol,
    client: Arc<dyn ProtocolClient>,
}

struct Destination {
    target: String,
    protocol: Protocol,
    options: serde_json::Value,
}

/// Targets and pipes built from one configuration. Replaced wholesale.
#[derive(Default)]
struct Routing {
    targets: HashMap<String, Target>,
    pipes: HashMap<String, Vec<Destination>>,
}

/// Routes logical publishes to the configured protocol targets.
///
/// A publish names a `message_id`. Every destination of the pipe with that
/// id receives a protocol message built from the payload, and local
/// subscribers of the same id receive the raw payload through the built-in
/// loopback client.
///
/// Subscribing works from construction on. Publishing and reconnecting
/// require [`initialize`](Self::initialize).
pub struct MessageBroker {
    config: Mutex<BrokerConfig>,
    credentials: Credentials,
    expander: Arc<MacroExpander>,
    factories: HashMap<Protocol, Box<dyn ProtocolFactory>>,
    loopback: Arc<LoopbackClient>,
    routing: RwLock<Option<Arc<Routing>>>,
}

impl MessageBroker {
    pub fn new(config: BrokerConfig) -> Result<Self> {
        Self::with_settings(config, Credentials::default(), WorkerSizes::default())
    }

    pub fn with_settings(
        config: BrokerConfig,
        credentials: Credentials,
        workers: WorkerSizes,
    ) -> Result<Self> {
        let expander = Arc::new(MacroExpander::new());
        let factories = default_factories(expander.clone(), workers)
            .into_iter()
            .map(|f| (f.protocol(), f))
            .collect();
        Ok(Self {
            config: Mutex::new(config),
            credentials,
            expander,
            factories,
            loopback: Arc::new(LoopbackClient::new()?),
            routing: RwLock::new(None),
        })
    }

    /// Replaces the factory of `factory.protocol()`. Takes effect at the
    /// next `initialize` or `reload`.
    pub fn with_factory(mut self, factory: Box<dyn ProtocolFactory>) -> Self {
        self.factories.insert(factory.protocol(), factory);
        self
    }

    /// The expander shared by every factory of this broker.
    pub fn expander(&self) -> Arc<MacroExpander> {
        self.expander.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.routing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Creates the targets and validates the pipes. Idempotent.
    pub fn initialize(&self) -> Result<()> {
        let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
        if routing.is_some() {
            return Ok(());
        }
        let config = self.config.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let built = self.build(&config)?;
        info!(
            "broker initialized with {} targets and {} pipes",
            built.targets.len(),
            built.pipes.len()
        );
        *routing = Some(Arc::new(built));
        Ok(())
    }

    /// Tears down the current targets and initializes from `config`.
    ///
    /// Local subscriptions survive. On failure the broker is left
    /// uninitialized.
    pub fn reload(&self, config: BrokerConfig) -> Result<()> {
        let mut routing = self.routing.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = routing.take() {
            release(&old);
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
        let built = self.build(&config)?;
        info!(
            "broker reloaded with {} targets and {} pipes",
            built.targets.len(),
            built.pipes.len()
        );
        *routing = Some(Arc::new(built));
        Ok(())
    }

    fn factory(&self, protocol: Protocol) -> Result<&dyn ProtocolFactory> {
        self.factories
            .get(&protocol)
            .map(|f| &**f)
            .ok_or_else(|| BrokerError::NotFound(format!("no factory for protocol '{protocol}'")))
    }

    fn build(&self, config: &BrokerConfig) -> Result<Routing> {
        let mut routing = Routing::default();

        for target in &config.targets {
            if target.name.is_empty() {
                return Err(BrokerError::invalid("target name is empty"));
            }
            if routing.targets.contains_key(&target.name) {
                return Err(BrokerError::invalid(format!(
                    "duplicate target '{}'",
                    target.name
                )));
            }
            let protocol: Protocol = target.protocol.parse()?;
            let client = self.create_target(protocol, target)?;
            routing
                .targets
                .insert(target.name.clone(), Target { protocol, client });
            info!("target '{}' ({protocol}) created", target.name);
        }

        for pipe in &config.pipes {
            if pipe.message_id.is_empty() {
                return Err(BrokerError::invalid("pipe message_id is empty"));
            }
            let destinations = routing.pipes.entry(pipe.message_id.clone()).or_default();
            for destination in &pipe.destinations {
                let target = routing.targets.get(&destination.target_name).ok_or_else(|| {
                    BrokerError::invalid(format!(
                        "pipe '{}' names unknown target '{}'",
                        pipe.message_id, destination.target_name
                    ))
                })?;
                let factory = self.factory(target.protocol)?;
                let options = destination.block(&factory.message_options_key()).clone();
                factory.validate_message_options(&options)?;
                destinations.push(Destination {
                    target: destination.target_name.clone(),
                    protocol: target.protocol,
                    options,
                });
            }
        }

        Ok(routing)
    }

    fn create_target(
        &self,
        protocol: Protocol,
        config: &TargetConfig,
    ) -> Result<Arc<dyn ProtocolClient>> {
        if !config.mqtt_subscriptions.is_empty() && protocol != Protocol::Mqtt {
            return Err(BrokerError::invalid(format!(
                "target '{}': mqtt_subscriptions require the mqtt protocol",
                config.name
            )));
        }
        // loopback targets address the broker's own local subscribers
        if protocol == Protocol::Loopback {
            return Ok(self.loopback.clone());
        }

        let factory = self.factory(protocol)?;
        let client: Arc<dyn ProtocolClient> =
            Arc::from(factory.create_protocol(config.block(&factory.options_key()), &self.credentials)?);

        for ingress in &config.mqtt_subscriptions {
            if ingress.subscription_id.is_empty() {
                return Err(BrokerError::invalid(format!(
                    "target '{}': mqtt subscription_id is empty",
                    config.name
                )));
            }
            let subscription = factory.create_subscription(&json!({ "topic": ingress.topic }))?;
            let handler = forward_to(Arc::downgrade(&self.loopback), ingress.subscription_id.clone());
            client.subscribe(subscription, handler)?;
            info!(
                "target '{}': '{}' forwards to local '{}'",
                config.name, ingress.topic, ingress.subscription_id
            );
        }
        Ok(client)
    }

    fn routing(&self) -> Result<Arc<Routing>> {
        self.routing
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| BrokerError::invalid("broker is not initialized"))
    }

    /// Registers a local subscriber for publishes of `subscription_id`.
    pub fn subscribe(&self, subscription_id: &str, handler: EventHandler) -> Result<CancellationToken> {
        self.loopback
            .subscribe(Subscription::loopback(subscription_id), handler)
    }

    pub fn unsubscribe(&self, token: CancellationToken) -> Result<UnsubscribeStatus> {
        self.loopback.unsubscribe(token)
    }

    fn message_for(
        &self,
        routing: &Routing,
        destination: &Destination,
        payload: Arc<Payload>,
    ) -> Result<(Arc<dyn ProtocolClient>, ProtocolMessage)> {
        let target = routing.targets.get(&destination.target).ok_or_else(|| {
            BrokerError::NotFound(format!("target '{}'", destination.target))
        })?;
        let message = self
            .factory(destination.protocol)?
            .create_message(payload, &destination.options)?;
        Ok((target.client.clone(), message))
    }

    /// Publishes to every destination of `message_id`, then to local
    /// subscribers, blocking until each transport call returns.
    ///
    /// A failing destination does not stop the others; the returned
    /// [`BrokerError::Delivery`] names every target that failed. Failures
    /// of local subscribers are logged and not reported.
    pub fn publish(&self, message_id: &str, payload: Arc<Payload>) -> Result<()> {
        if message_id.is_empty() {
            return Err(BrokerError::invalid("message_id is empty"));
        }
        let routing = self.routing()?;
        let mut failed = Vec::new();

        for destination in routing.pipes.get(message_id).into_iter().flatten() {
            let result = self
                .message_for(&routing, destination, payload.clone())
                .and_then(|(client, message)| client.publish(&message));
            if let Err(e) = result {
                error!("'{message_id}' -> '{}': {e}", destination.target);
                failed.push(destination.target.clone());
            }
        }

        let local = ProtocolMessage::loopback(payload, message_id)?;
        if let Err(e) = self.loopback.publish(&local) {
            warn!("'{message_id}' local delivery: {e}");
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::Delivery { failed })
        }
    }

    /// Publishes without blocking on transports.
    ///
    /// `handler` runs once per dispatched destination and once for the local
    /// delivery when a local subscriber exists. Destinations whose message
    /// cannot be built are never dispatched and are named in the returned
    /// [`BrokerError::Delivery`].
    pub fn publish_async(
        &self,
        message_id: &str,
        payload: Arc<Payload>,
        handler: PublishHandler,
    ) -> Result<()> {
        if message_id.is_empty() {
            return Err(BrokerError::invalid("message_id is empty"));
        }
        let routing = self.routing()?;
        let mut failed = Vec::new();

        for destination in routing.pipes.get(message_id).into_iter().flatten() {
            match self.message_for(&routing, destination, payload.clone()) {
                Ok((client, message)) => {
                    client.publish_async(Arc::new(message), completion(&handler));
                }
                Err(e) => {
                    error!("'{message_id}' -> '{}': {e}", destination.target);
                    failed.push(destination.target.clone());
                }
            }
        }

        let local = ProtocolMessage::loopback(payload, message_id)?;
        self.loopback.publish_async(Arc::new(local), completion(&handler));

        if failed.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::Delivery { failed })
        }
    }

    pub fn publish_str(&self, message_id: &str, text: &str) -> Result<()> {
        self.publish(message_id, Arc::new(Payload::from_string(text)))
    }

    pub fn publish_str_async(
        &self,
        message_id: &str,
        text: &str,
        handler: PublishHandler,
    ) -> Result<()> {
        self.publish_async(message_id, Arc::new(Payload::from_string(text)), handler)
    }

    /// Re-establishes the transport session of one target.
    pub fn reconnect(&self, target_name: &str) -> Result<()> {
        let routing = self.routing()?;
        let target = routing
            .targets
            .get(target_name)
            .ok_or_else(|| BrokerError::NotFound(format!("target '{target_name}'")))?;
        target.client.reconnect()?;
        info!("target '{target_name}' reconnected");
        Ok(())
    }

    /// Blocks until every accepted asynchronous publish has completed.
    pub fn flush(&self) {
        if let Ok(routing) = self.routing() {
            for target in routing.targets.values() {
                target.client.flush();
            }
        }
        self.loopback.flush();
    }
}

fn completion(handler: &PublishHandler) -> CompletionHandler {
    let handler = handler.clone();
    Box::new(move |protocol, message, success| handler(protocol, message, success))
}

/// Re-publishes incoming payloads to local subscribers of `subscription_id`.
fn forward_to(loopback: Weak<LoopbackClient>, subscription_id: String) -> EventHandler {
    Arc::new(move |payload| {
        let Some(loopback) = loopback.upgrade() else {
            return Ok(());
        };
        debug!("forwarding {} to local '{subscription_id}'", payload.id());
        loopback.publish(&ProtocolMessage::loopback(payload, subscription_id.as_str())?)
    })
}

/// Cancels the subscriptions of every target the routing owns.
fn release(routing: &Routing) {
    for (name, target) in &routing.targets {
        if target.protocol == Protocol::Loopback {
            continue;
        }
        target.client.unsubscribe_all();
        debug!("target '{name}' released");
    }
}

impl Drop for MessageBroker {
    fn drop(&mut self) {
        let routing = self
            .routing
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(routing) = routing {
            release(&routing);
        }
        self.loopback.unsubscribe_all();
        info!("broker shut down");
    }
}
