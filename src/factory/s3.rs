use std::sync::Arc;

use serde_json::Value;

use super::options::{object, optional_bool, required_str};
use super::{Credentials, ProtocolFactory};
use crate::expansion::MacroExpander;
use crate::payload::Payload;
use crate::protocol::s3::AwsObjectStore;
use crate::protocol::{ObjectStore, Protocol, ProtocolClient, ProtocolMessage, S3Client};
use crate::utils::Result;

const BLOCK: &str = "s3_options";
const MESSAGE_BLOCK: &str = "s3_message_options";

pub struct S3Factory {
    expander: Arc<MacroExpander>,
    workers: usize,
    store: Option<Arc<dyn ObjectStore>>,
}

impl S3Factory {
    pub fn new(expander: Arc<MacroExpander>, workers: usize) -> Self {
        Self {
            expander,
            workers,
            store: None,
        }
    }

    /// Uses `store` for every client instead of connecting to AWS.
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl ProtocolFactory for S3Factory {
    fn protocol(&self) -> Protocol {
        Protocol::S3
    }

    fn create_protocol(&self, options: &Value, _credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        let options = object(options, BLOCK)?;
        let region = required_str(options, BLOCK, "region")?;
        let store = match &self.store {
            Some(store) => store.clone(),
            None => Arc::new(AwsObjectStore::connect(region)?),
        };
        Ok(Box::new(S3Client::new(
            store,
            self.expander.clone(),
            self.workers,
        )?))
    }

    fn validate_message_options(&self, options: &Value) -> Result<()> {
        let options = object(options, MESSAGE_BLOCK)?;
        required_str(options, MESSAGE_BLOCK, "bucket")?;
        required_str(options, MESSAGE_BLOCK, "key")?;
        optional_bool(options, MESSAGE_BLOCK, "overwrite", true)?;
        optional_bool(options, MESSAGE_BLOCK, "batch_payload_expansion", true)?;
        Ok(())
    }

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage> {
        let options = object(options, MESSAGE_BLOCK)?;
        let bucket = required_str(options, MESSAGE_BLOCK, "bucket")?;
        let key = required_str(options, MESSAGE_BLOCK, "key")?;
        let overwrite = optional_bool(options, MESSAGE_BLOCK, "overwrite", true)?;
        let batch_payload_expansion =
            optional_bool(options, MESSAGE_BLOCK, "batch_payload_expansion", true)?;
        ProtocolMessage::s3(
            payload,
            &self.expander,
            bucket,
            key,
            overwrite,
            batch_payload_expansion,
        )
    }
}
