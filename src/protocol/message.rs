//! Protocol messages: a shared [`Payload`] plus protocol-specific addressing.
//!
//! Every constructor validates its template fields and expands their macros
//! against the payload, so an existing `ProtocolMessage` is always routable.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::Protocol;
use crate::expansion::{MacroExpander, validate_template};
use crate::payload::Payload;
use crate::utils::{BrokerError, Result};

/// Rule name matching every payload classification.
pub const ALL_RULE: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttAddress {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Address {
    pub bucket: String,
    /// Expanded key. Left as the template when a batch is split per member.
    pub key: String,
    /// Unexpanded key, re-expanded per member when a batch is split.
    pub key_template: String,
    pub overwrite: bool,
    pub batch_payload_expansion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAddress {
    pub directory: PathBuf,
    pub filename: String,
}

impl FileAddress {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

/// Signal edge of a GPIO rule; decides the level driven during the pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEdge {
    Rising,
    Falling,
}

impl SignalEdge {
    /// Level held for the pulse width. The opposite level is restored after.
    pub fn active_high(&self) -> bool {
        matches!(self, SignalEdge::Rising)
    }
}

impl FromStr for SignalEdge {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rising" => Ok(SignalEdge::Rising),
            "falling" => Ok(SignalEdge::Falling),
            other => Err(BrokerError::invalid(format!(
                "unknown signal type '{other}', expected 'rising' or 'falling'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioRule {
    pub name: String,
    pub edge: SignalEdge,
    pub pin: u8,
    pub pulse_width: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioAddress {
    pub rules: Vec<GpioRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackAddress {
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Mqtt(MqttAddress),
    S3(S3Address),
    File(FileAddress),
    Gpio(GpioAddress),
    Loopback(LoopbackAddress),
}

impl Address {
    pub fn protocol(&self) -> Protocol {
        match self {
            Address::Mqtt(_) => Protocol::Mqtt,
            Address::S3(_) => Protocol::S3,
            Address::File(_) => Protocol::File,
            Address::Gpio(_) => Protocol::Gpio,
            Address::Loopback(_) => Protocol::Loopback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolMessage {
    payload: Arc<Payload>,
    address: Address,
}

impl ProtocolMessage {
    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn protocol(&self) -> Protocol {
        self.address.protocol()
    }

    pub fn loopback(payload: Arc<Payload>, subscription_id: impl Into<String>) -> Result<Self> {
        let subscription_id = subscription_id.into();
        if subscription_id.is_empty() {
            return Err(BrokerError::invalid("loopback subscription id is empty"));
        }
        Ok(Self {
            payload,
            address: Address::Loopback(LoopbackAddress { subscription_id }),
        })
    }

    pub fn mqtt(payload: Arc<Payload>, expander: &MacroExpander, topic: &str) -> Result<Self> {
        let topic = expand_field(expander, "topic", topic, &payload)?;
        Ok(Self {
            payload,
            address: Address::Mqtt(MqttAddress { topic }),
        })
    }

    pub fn s3(
        payload: Arc<Payload>,
        expander: &MacroExpander,
        bucket: &str,
        key: &str,
        overwrite: bool,
        batch_payload_expansion: bool,
    ) -> Result<Self> {
        let bucket = expand_field(expander, "bucket", bucket, &payload)?;
        // batch members are expanded one by one at upload time
        let expanded_key = if payload.is_batch() && batch_payload_expansion {
            if key.is_empty() {
                return Err(BrokerError::invalid("'key' is empty"));
            }
            validate_template(key)?;
            key.to_string()
        } else {
            expand_field(expander, "key", key, &payload)?
        };
        Ok(Self {
            payload,
            address: Address::S3(S3Address {
                bucket,
                key: expanded_key,
                key_template: key.to_string(),
                overwrite,
                batch_payload_expansion,
            }),
        })
    }

    pub fn file(
        payload: Arc<Payload>,
        expander: &MacroExpander,
        directory: &str,
        filename: &str,
    ) -> Result<Self> {
        let directory = expand_field(expander, "directory", directory, &payload)?;
        let filename = expand_field(expander, "filename", filename, &payload)?;
        if Path::new(&filename).is_absolute() {
            return Err(BrokerError::invalid(format!(
                "filename '{filename}' must be relative to the directory"
            )));
        }
        Ok(Self {
            payload,
            address: Address::File(FileAddress {
                directory: PathBuf::from(directory),
                filename,
            }),
        })
    }

    /// Builds a GPIO message from `;`-delimited parallel lists.
    ///
    /// All four lists must have the same number of entries; nothing touches
    /// hardware here.
    pub fn gpio(
        payload: Arc<Payload>,
        expander: &MacroExpander,
        rules: &str,
        signal_types: &str,
        pins: &str,
        pulse_width_ms: &str,
    ) -> Result<Self> {
        let rules_expanded = expand_field(expander, "rules", rules, &payload)?;
        let rules = split_list("rules", &rules_expanded)?;
        let edges_expanded = expand_field(expander, "signal_types", signal_types, &payload)?;
        let edges = split_list("signal_types", &edges_expanded)?;
        let pins_expanded = expand_field(expander, "pins", pins, &payload)?;
        let pins = split_list("pins", &pins_expanded)?;
        let widths_expanded = expand_field(expander, "pulse_width_ms", pulse_width_ms, &payload)?;
        let widths = split_list("pulse_width_ms", &widths_expanded)?;

        let n = rules.len();
        if edges.len() != n || pins.len() != n || widths.len() != n {
            return Err(BrokerError::invalid(format!(
                "gpio lists differ in length: rules={n}, signal_types={}, pins={}, pulse_width_ms={}",
                edges.len(),
                pins.len(),
                widths.len()
            )));
        }

        let mut parsed = Vec::with_capacity(n);
        for (((name, edge), pin), width) in rules.into_iter().zip(edges).zip(pins).zip(widths) {
            let pin: u8 = pin
                .parse()
                .map_err(|_| BrokerError::invalid(format!("pins: '{pin}' is not a pin number")))?;
            let width: u64 = width.parse().map_err(|_| {
                BrokerError::invalid(format!("pulse_width_ms: '{width}' is not an integer"))
            })?;
            parsed.push(GpioRule {
                name: name.to_string(),
                edge: edge.parse()?,
                pin,
                pulse_width: Duration::from_millis(width),
            });
        }

        Ok(Self {
            payload,
            address: Address::Gpio(GpioAddress { rules: parsed }),
        })
    }
}

fn expand_field(
    expander: &MacroExpander,
    field: &str,
    template: &str,
    payload: &Payload,
) -> Result<String> {
    if template.is_empty() {
        return Err(BrokerError::invalid(format!("'{field}' is empty")));
    }
    validate_template(template)?;
    Ok(expander.expand(template, Some(payload)))
}

fn split_list<'a>(field: &str, list: &'a str) -> Result<Vec<&'a str>> {
    let items: Vec<&str> = list.split(';').map(str::trim).collect();
    if items.iter().any(|item| item.is_empty()) {
        return Err(BrokerError::invalid(format!(
            "'{field}' has an empty entry: '{list}'"
        )));
    }
    Ok(items)
}
