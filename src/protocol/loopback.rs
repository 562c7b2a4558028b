use std::sync::Arc;

use tracing::debug;

use super::{
    Address, CompletionHandler, Protocol, ProtocolClient, ProtocolMessage, Subscription,
    SubscriptionRegistry, wrong_message, wrong_subscription,
};
use crate::queue::JobQueue;
use crate::utils::{BrokerError, Result};

/// In-process transport delivering messages to local subscribers.
pub struct LoopbackClient {
    registry: Arc<SubscriptionRegistry>,
    queue: JobQueue<Arc<ProtocolMessage>>,
}

impl LoopbackClient {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let queue = JobQueue::new("loopback");
        let dispatch_registry = registry.clone();
        queue.set_processor(move |message: &Arc<ProtocolMessage>| {
            dispatch(&dispatch_registry, message)
        });
        queue.start()?;
        Ok(Self { registry, queue })
    }

    /// Whether any local subscriber listens on `subscription_id`.
    pub fn has_subscriber(&self, subscription_id: &str) -> bool {
        self.registry
            .any(|s| matches_id(s, subscription_id))
    }
}

fn matches_id(subscription: &Subscription, id: &str) -> bool {
    matches!(subscription, Subscription::Loopback { subscription_id } if subscription_id == id)
}

fn subscription_id(message: &ProtocolMessage) -> Result<&str> {
    match message.address() {
        Address::Loopback(addr) => Ok(&addr.subscription_id),
        _ => Err(wrong_message(Protocol::Loopback, message)),
    }
}

fn dispatch(registry: &SubscriptionRegistry, message: &ProtocolMessage) -> Result<()> {
    let id = subscription_id(message)?;
    let report = registry.invoke_on_message_received(message.payload(), |s| matches_id(s, id));
    debug!(
        "loopback '{id}': delivered to {}, {} failed",
        report.delivered, report.failed
    );
    if report.failed > 0 {
        return Err(BrokerError::Handler(format!(
            "{} of {} subscribers of '{id}' failed",
            report.failed,
            report.failed + report.delivered
        )));
    }
    Ok(())
}

impl ProtocolClient for LoopbackClient {
    fn protocol(&self) -> Protocol {
        Protocol::Loopback
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn check_subscription(&self, subscription: &Subscription) -> Result<()> {
        match subscription {
            Subscription::Loopback { subscription_id } if subscription_id.is_empty() => {
                Err(BrokerError::invalid("loopback subscription id is empty"))
            }
            Subscription::Loopback { .. } => Ok(()),
            other => Err(wrong_subscription(Protocol::Loopback, other)),
        }
    }

    /// Dispatches on the calling thread.
    fn publish(&self, message: &ProtocolMessage) -> Result<()> {
        dispatch(&self.registry, message)
    }

    /// Queues the dispatch only when a subscriber exists for the id.
    ///
    /// Without subscribers nothing is queued and `handler` is never called.
    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler) {
        let id = match subscription_id(&message) {
            Ok(id) => id,
            Err(e) => {
                debug!("{e}");
                handler(Protocol::Loopback.as_str(), &message, false);
                return;
            }
        };
        if !self.has_subscriber(id) {
            debug!("loopback '{id}': no subscribers, nothing queued");
            return;
        }
        self.queue.enqueue(
            message,
            Some(Box::new(move |message, result| {
                handler(Protocol::Loopback.as_str(), &message, result.is_ok())
            })),
        );
    }

    fn flush(&self) {
        self.queue.wait_idle();
    }
}

impl Drop for LoopbackClient {
    fn drop(&mut self) {
        self.unsubscribe_all();
        self.queue.wait_idle();
        self.queue.stop();
    }
}
