use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::options::{object, optional_str, required_str};
use super::{Credentials, ProtocolFactory};
use crate::expansion::MacroExpander;
use crate::payload::Payload;
use crate::protocol::{
    MqttClient, MqttSettings, Protocol, ProtocolClient, ProtocolMessage, Subscription, TlsMaterial,
};
use crate::utils::{BrokerError, Result};

const BLOCK: &str = "mqtt_options";
const MESSAGE_BLOCK: &str = "mqtt_message_options";
const SUBSCRIPTION_BLOCK: &str = "mqtt_subscription_options";

const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

pub struct MqttFactory {
    expander: Arc<MacroExpander>,
}

impl MqttFactory {
    pub fn new(expander: Arc<MacroExpander>) -> Self {
        Self { expander }
    }

    /// Connection settings from `mqtt_options` and the credential files.
    pub fn settings(&self, options: &Value, credentials: &Credentials) -> Result<MqttSettings> {
        let options = object(options, BLOCK)?;
        let endpoint = required_str(options, BLOCK, "endpoint")?;
        let region = required_str(options, BLOCK, "region")?;
        let client_id = match optional_str(options, BLOCK, "client-id")? {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("edgebus-{}", Uuid::new_v4().simple()),
        };

        let tls = tls_material(credentials)?;
        let default_port = if tls.is_some() { TLS_PORT } else { PLAIN_PORT };
        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    BrokerError::invalid(format!("{BLOCK}: endpoint '{endpoint}' has an invalid port"))
                })?;
                (host.to_string(), port)
            }
            None => (endpoint.to_string(), default_port),
        };

        Ok(MqttSettings {
            host,
            port,
            client_id,
            region: region.to_string(),
            keep_alive: KEEP_ALIVE,
            tls,
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| BrokerError::invalid(format!("credentials: cannot read {}: {e}", path.display())))
}

fn tls_material(credentials: &Credentials) -> Result<Option<TlsMaterial>> {
    let Some(ca_path) = &credentials.ca_path else {
        return Ok(None);
    };
    let client_auth = match (&credentials.cert_path, &credentials.key_path) {
        (Some(cert), Some(key)) => Some((read(cert)?, read(key)?)),
        (None, None) => None,
        _ => {
            return Err(BrokerError::invalid(
                "credentials: cert_path and key_path must be given together",
            ));
        }
    };
    Ok(Some(TlsMaterial {
        ca: read(ca_path)?,
        client_auth,
    }))
}

impl ProtocolFactory for MqttFactory {
    fn protocol(&self) -> Protocol {
        Protocol::Mqtt
    }

    fn create_protocol(&self, options: &Value, credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        let settings = self.settings(options, credentials)?;
        Ok(Box::new(MqttClient::connect(settings)?))
    }

    fn validate_message_options(&self, options: &Value) -> Result<()> {
        required_str(object(options, MESSAGE_BLOCK)?, MESSAGE_BLOCK, "topic")?;
        Ok(())
    }

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage> {
        let topic = required_str(object(options, MESSAGE_BLOCK)?, MESSAGE_BLOCK, "topic")?;
        ProtocolMessage::mqtt(payload, &self.expander, topic)
    }

    fn create_subscription(&self, options: &Value) -> Result<Subscription> {
        let topic = required_str(
            object(options, SUBSCRIPTION_BLOCK)?,
            SUBSCRIPTION_BLOCK,
            "topic",
        )?;
        Ok(Subscription::mqtt(topic))
    }
}
