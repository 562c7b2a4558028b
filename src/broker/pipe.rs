use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::{BrokerError, Result};

/// Routing configuration of a [`MessageBroker`](super::MessageBroker).
///
/// ```json
/// {
///   "targets": [{ "protocol": "file", "name": "f", "file_options": {} }],
///   "pipes": [{
///     "message_id": "m",
///     "destinations": [{
///       "target_name": "f",
///       "file_message_options": { "directory": "./out", "filename": "${count}_frame" }
///     }]
///   }]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub pipes: Vec<PipeConfig>,
}

/// A named protocol client and its `<protocol>_options` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub protocol: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mqtt_subscriptions: Vec<MqttSubscriptionConfig>,
    /// Every other field, including the option block.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// An MQTT topic re-published locally under `subscription_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSubscriptionConfig {
    pub subscription_id: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeConfig {
    pub message_id: String,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
}

/// One target of a pipe and its `<protocol>_message_options` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub target_name: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl FromStr for BrokerConfig {
    type Err = BrokerError;

    fn from_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl BrokerConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }
}

fn block<'a>(options: &'a Map<String, Value>, key: &str) -> &'a Value {
    options.get(key).unwrap_or(&Value::Null)
}

impl TargetConfig {
    /// The option block named `key`, `null` when absent.
    pub fn block(&self, key: &str) -> &Value {
        block(&self.options, key)
    }
}

impl DestinationConfig {
    pub fn block(&self, key: &str) -> &Value {
        block(&self.options, key)
    }
}
