use std::fs;
use std::sync::Arc;

use tracing::{debug, error};

use super::{
    Address, CompletionHandler, Protocol, ProtocolClient, ProtocolMessage, SubscriptionRegistry,
    wrong_message,
};
use crate::queue::MultiWorkerJobQueue;
use crate::utils::{BrokerError, Result};

/// Writes serialized payloads to the local filesystem.
pub struct FileClient {
    registry: SubscriptionRegistry,
    queue: MultiWorkerJobQueue<Arc<ProtocolMessage>>,
}

impl FileClient {
    pub fn new(workers: usize) -> Result<Self> {
        let queue = MultiWorkerJobQueue::new("file", workers);
        queue.set_processor(|message: &Arc<ProtocolMessage>| write(message));
        queue.start()?;
        Ok(Self {
            registry: SubscriptionRegistry::new(),
            queue,
        })
    }
}

fn write(message: &ProtocolMessage) -> Result<()> {
    let Address::File(addr) = message.address() else {
        return Err(wrong_message(Protocol::File, message));
    };
    let path = addr.path();
    fs::create_dir_all(&addr.directory)
        .and_then(|_| fs::write(&path, message.payload().serialize()))
        .map_err(|e| {
            error!("failed to write {}: {e}", path.display());
            BrokerError::transport(format!("write {}: {e}", path.display()))
        })?;
    debug!("wrote payload {} to {}", message.payload().id(), path.display());
    Ok(())
}

impl ProtocolClient for FileClient {
    fn protocol(&self) -> Protocol {
        Protocol::File
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<()> {
        write(message)
    }

    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler) {
        self.queue.enqueue(
            message,
            Some(Box::new(move |message, result| {
                handler(Protocol::File.as_str(), &message, result.is_ok())
            })),
        );
    }

    fn flush(&self) {
        self.queue.wait_idle();
    }
}

impl Drop for FileClient {
    fn drop(&mut self) {
        self.queue.wait_idle();
        self.queue.stop();
    }
}
