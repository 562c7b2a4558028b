use std::sync::Arc;

use serde_json::Value;

use super::options::{object, required_str};
use super::{Credentials, ProtocolFactory};
use crate::payload::Payload;
use crate::protocol::{LoopbackClient, Protocol, ProtocolClient, ProtocolMessage, Subscription};
use crate::utils::Result;

const MESSAGE_BLOCK: &str = "loopback_message_options";
const SUBSCRIPTION_BLOCK: &str = "loopback_subscription_options";

#[derive(Default)]
pub struct LoopbackFactory;

impl LoopbackFactory {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolFactory for LoopbackFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Loopback
    }

    fn create_protocol(&self, options: &Value, _credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        object(options, "loopback_options")?;
        Ok(Box::new(LoopbackClient::new()?))
    }

    fn validate_message_options(&self, options: &Value) -> Result<()> {
        required_str(object(options, MESSAGE_BLOCK)?, MESSAGE_BLOCK, "subscription_id")?;
        Ok(())
    }

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage> {
        let id = required_str(object(options, MESSAGE_BLOCK)?, MESSAGE_BLOCK, "subscription_id")?;
        ProtocolMessage::loopback(payload, id)
    }

    fn create_subscription(&self, options: &Value) -> Result<Subscription> {
        let id = required_str(
            object(options, SUBSCRIPTION_BLOCK)?,
            SUBSCRIPTION_BLOCK,
            "subscription_id",
        )?;
        Ok(Subscription::loopback(id))
    }
}
