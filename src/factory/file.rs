use std::sync::Arc;

use serde_json::Value;

use super::options::{object, required_str};
use super::{Credentials, ProtocolFactory};
use crate::expansion::MacroExpander;
use crate::payload::Payload;
use crate::protocol::{FileClient, Protocol, ProtocolClient, ProtocolMessage};
use crate::utils::Result;

const MESSAGE_BLOCK: &str = "file_message_options";

pub struct FileFactory {
    expander: Arc<MacroExpander>,
    workers: usize,
}

impl FileFactory {
    pub fn new(expander: Arc<MacroExpander>, workers: usize) -> Self {
        Self { expander, workers }
    }
}

impl ProtocolFactory for FileFactory {
    fn protocol(&self) -> Protocol {
        Protocol::File
    }

    /// `file_options` has no fields.
    fn create_protocol(&self, options: &Value, _credentials: &Credentials) -> Result<Box<dyn ProtocolClient>> {
        object(options, "file_options")?;
        Ok(Box::new(FileClient::new(self.workers)?))
    }

    fn validate_message_options(&self, options: &Value) -> Result<()> {
        let options = object(options, MESSAGE_BLOCK)?;
        required_str(options, MESSAGE_BLOCK, "directory")?;
        required_str(options, MESSAGE_BLOCK, "filename")?;
        Ok(())
    }

    fn create_message(&self, payload: Arc<Payload>, options: &Value) -> Result<ProtocolMessage> {
        let options = object(options, MESSAGE_BLOCK)?;
        let directory = required_str(options, MESSAGE_BLOCK, "directory")?;
        let filename = required_str(options, MESSAGE_BLOCK, "filename")?;
        ProtocolMessage::file(payload, &self.expander, directory, filename)
    }
}
