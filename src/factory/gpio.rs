use std::sync::Arc;

use serde_json::Value;

use super::options::{object, required_str};
use super::{Credentials, ProtocolFactory};
use crate::expansion::MacroExpander;
use crate::payload::Payload;
use crate::protocol::{GpioClient, PinDriver, Protocol, ProtocolClient, ProtocolMessage, RppalPinDriver};
use crate::utils::Result;

const MESSAGE_BLOCK: &str = "gpio_message_options";
const FIELDS: [&str; 4] = ["rules", "signal_types", "pins", "pulse_width_ms"];

pub struct GpioFactory {
    expander: Arc<MacroExpander>,
    driver: Option<Arc<dyn PinDriver>>,
}

impl GpioFactory {
    pub fn new(expander: Arc<MacroExpander>) -> Self {
        Self {
            expander,
            driver: None,
        }
    }

    /// Drives pins through `driver` instead of the Raspberry Pi peripheral.
    pub fn with_driver(mut self, driver: Arc<dyn PinDriver>) -> Self {
        self.driver = Some(driver);
        self
    }
}

impl ProtocolFactory for GpioFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Gpio
    }

    fn create_protocol(&self, options: &Value, _credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        object(options, "gpio_options")?;
        let driver = match &self.driver {
            Some(driver) => driver.clone(),
            None => Arc::new(RppalPinDriver::open()?),
        };
        Ok(Box::new(GpioClient::new(driver)?))
    }

    fn validate_message_options(&self, options: &Value) -> Result<()> {
        let options = object(options, MESSAGE_BLOCK)?;
        for field in FIELDS {
            required_str(options, MESSAGE_BLOCK, field)?;
        }
        Ok(())
    }

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage> {
        let options = object(options, MESSAGE_BLOCK)?;
        ProtocolMessage::gpio(
            payload,
            &self.expander,
            required_str(options, MESSAGE_BLOCK, "rules")?,
            required_str(options, MESSAGE_BLOCK, "signal_types")?,
            required_str(options, MESSAGE_BLOCK, "pins")?,
            required_str(options, MESSAGE_BLOCK, "pulse_width_ms")?,
        )
    }
}
