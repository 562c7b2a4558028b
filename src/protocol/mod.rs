//! The `protocol` module defines the transport abstraction of the broker.
//!
//! Every transport implements [`ProtocolClient`]. The trait's provided
//! methods carry the protocol-independent behavior (cancellation tokens,
//! subscription bookkeeping, teardown); each client supplies publishing and
//! the `on_subscription` / `on_unsubscribe` hooks.
//!
//! Addressing is a closed set: [`Address`] and [`Subscription`] are enums
//! with one variant per protocol, and a client rejects variants it does not
//! handle with [`BrokerError::NoInterface`].

pub mod file;
pub mod gpio;
pub mod loopback;
pub mod message;
pub mod mqtt;
pub mod registry;
mod runtime;
pub mod s3;
pub mod subscription;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

pub use file::FileClient;
pub use gpio::{GpioClient, PinDriver, RppalPinDriver};
pub use loopback::LoopbackClient;
pub use message::{
    Address, FileAddress, GpioAddress, GpioRule, LoopbackAddress, MqttAddress, ProtocolMessage,
    S3Address, SignalEdge,
};
pub use mqtt::{MqttClient, MqttSettings, TlsMaterial};
pub use registry::{DispatchReport, SubscriptionRegistry};
pub use s3::{AwsObjectStore, ObjectStore, S3Client};
pub use subscription::{Subscription, topic_matches};

use crate::payload::Payload;
use crate::utils::{BrokerError, Result};

/// Handle returned by `subscribe`, used to cancel the subscription.
pub type CancellationToken = u32;

/// Callback invoked for every payload delivered to a subscription.
pub type EventHandler = Arc<dyn Fn(Arc<Payload>) -> Result<()> + Send + Sync>;

/// Completion callback of `publish_async`: `(protocol_name, message, success)`.
pub type CompletionHandler = Box<dyn FnOnce(&str, &ProtocolMessage, bool) + Send>;

/// Outcome of an unsubscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeStatus {
    Removed,
    /// The token was not registered; nothing was done.
    NothingToDo,
}

/// Supported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Mqtt,
    S3,
    File,
    Gpio,
    Loopback,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Mqtt => "mqtt",
            Protocol::S3 => "s3",
            Protocol::File => "file",
            Protocol::Gpio => "gpio",
            Protocol::Loopback => "loopback",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mqtt" => Ok(Protocol::Mqtt),
            "s3" => Ok(Protocol::S3),
            "file" => Ok(Protocol::File),
            "gpio" => Ok(Protocol::Gpio),
            "loopback" => Ok(Protocol::Loopback),
            other => Err(BrokerError::invalid(format!("unknown protocol '{other}'"))),
        }
    }
}

/// A transport able to publish protocol messages and, for some protocols,
/// deliver incoming payloads to registered subscriptions.
pub trait ProtocolClient: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn registry(&self) -> &SubscriptionRegistry;

    /// Accepts the subscription kinds this client understands.
    ///
    /// Publish-only protocols keep the default.
    fn check_subscription(&self, _subscription: &Subscription) -> Result<()> {
        Err(BrokerError::NotImplemented(format!(
            "{} does not support subscriptions",
            self.protocol()
        )))
    }

    fn on_subscription(&self, _token: CancellationToken, _subscription: &Subscription) -> Result<()> {
        Ok(())
    }

    fn on_unsubscribe(&self, _token: CancellationToken, _subscription: &Subscription) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self, subscription: Subscription, handler: EventHandler) -> Result<CancellationToken> {
        self.check_subscription(&subscription)?;
        let token = self.registry().insert(subscription.clone(), handler);
        if let Err(e) = self.on_subscription(token, &subscription) {
            self.registry().remove(token);
            return Err(e);
        }
        debug!("{}: subscribed {subscription} as {token}", self.protocol());
        Ok(token)
    }

    fn unsubscribe(&self, token: CancellationToken) -> Result<UnsubscribeStatus> {
        let Some(subscription) = self.registry().get(token) else {
            return Ok(UnsubscribeStatus::NothingToDo);
        };
        let hook = self.on_unsubscribe(token, &subscription);
        self.registry().remove(token);
        hook?;
        debug!("{}: unsubscribed {token}", self.protocol());
        Ok(UnsubscribeStatus::Removed)
    }

    /// Cancels every remaining subscription.
    fn unsubscribe_all(&self) {
        for token in self.registry().tokens() {
            if let Err(e) = self.unsubscribe(token) {
                warn!("{}: failed to unsubscribe {token}: {e}", self.protocol());
            }
        }
    }

    /// Publishes and blocks until the transport call completes.
    fn publish(&self, message: &ProtocolMessage) -> Result<()>;

    /// Publishes without blocking; `handler` reports the outcome.
    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler);

    /// Re-establishes the transport session, keeping subscriptions.
    fn reconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Blocks until every accepted asynchronous publish has completed.
    fn flush(&self) {}
}

/// Rejects a message whose address belongs to another protocol.
pub(crate) fn wrong_message(expected: Protocol, message: &ProtocolMessage) -> BrokerError {
    BrokerError::NoInterface(format!(
        "{expected} client cannot publish a {} message",
        message.protocol()
    ))
}

/// Rejects a subscription that belongs to another protocol.
pub(crate) fn wrong_subscription(expected: Protocol, subscription: &Subscription) -> BrokerError {
    BrokerError::NoInterface(format!(
        "{expected} client cannot handle a {} subscription",
        subscription.protocol()
    ))
}
