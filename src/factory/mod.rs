//! The `factory` module turns JSON configuration into protocol objects.
//!
//! One [`ProtocolFactory`] exists per protocol. Factories validate every
//! option for presence and type before use, and report failures naming the
//! offending block and field.

pub mod file;
pub mod gpio;
pub mod loopback;
pub mod mqtt;
pub mod options;
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

pub use file::FileFactory;
pub use gpio::GpioFactory;
pub use loopback::LoopbackFactory;
pub use mqtt::MqttFactory;
pub use s3::S3Factory;

use crate::expansion::MacroExpander;
use crate::payload::Payload;
use crate::protocol::{Protocol, ProtocolClient, ProtocolMessage, Subscription};
use crate::queue::multi_worker::DEFAULT_WORKERS;
use crate::utils::{BrokerError, Result};

/// Credential files handed to `create_protocol`.
///
/// MQTT switches to TLS when `ca_path` is set and presents the client
/// certificate when both `cert_path` and `key_path` are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// Worker pool sizes for the clients that publish concurrently.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSizes {
    pub file: usize,
    pub s3: usize,
}

impl Default for WorkerSizes {
    fn default() -> Self {
        Self {
            file: DEFAULT_WORKERS,
            s3: DEFAULT_WORKERS,
        }
    }
}

/// Builds clients, messages and subscriptions of one protocol from JSON.
pub trait ProtocolFactory: Send + Sync {
    fn protocol(&self) -> Protocol;

    fn create_protocol(
        &self,
        options: &Value,
        credentials: &Credentials,
    ) -> Result<Box<dyn ProtocolClient>>;

    fn validate_message_options(&self, options: &Value) -> Result<()>;

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage>;

    fn create_subscription(&self, _options: &Value) -> Result<Subscription> {
        Err(BrokerError::NotImplemented(format!(
            "{} does not support subscriptions",
            self.protocol()
        )))
    }

    /// Name of the target option block, e.g. `s3_options`.
    fn options_key(&self) -> String {
        format!("{}_options", self.protocol())
    }

    /// Name of the destination option block, e.g. `s3_message_options`.
    fn message_options_key(&self) -> String {
        format!("{}_message_options", self.protocol())
    }
}

/// Factories for every built-in protocol, sharing one expander.
pub fn default_factories(
    expander: Arc<MacroExpander>,
    workers: WorkerSizes,
) -> Vec<Box<dyn ProtocolFactory>> {
    vec![
        Box::new(MqttFactory::new(expander.clone())),
        Box::new(S3Factory::new(expander.clone(), workers.s3)),
        Box::new(FileFactory::new(expander.clone(), workers.file)),
        Box::new(GpioFactory::new(expander)),
        Box::new(LoopbackFactory::new()),
    ]
}

#[cfg(test)]
mod tests;
