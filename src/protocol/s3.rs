//! S3 transport.
//!
//! Uploads go through the [`ObjectStore`] seam; [`AwsObjectStore`] is the
//! production implementation on top of `aws-sdk-s3`.

use std::sync::Arc;

use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, error, info};

use super::runtime::BackgroundRuntime;
use super::{
    Address, CompletionHandler, Protocol, ProtocolClient, ProtocolMessage, S3Address,
    SubscriptionRegistry, wrong_message,
};
use crate::expansion::MacroExpander;
use crate::queue::MultiWorkerJobQueue;
use crate::utils::{BrokerError, Result};

/// Minimal object storage operations needed for publishing.
pub trait ObjectStore: Send + Sync {
    fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
}

/// [`ObjectStore`] backed by Amazon S3.
///
/// Requests run on a small tokio runtime owned by the store, so the blocking
/// methods may be called from worker threads and from async code alike.
pub struct AwsObjectStore {
    runtime: BackgroundRuntime,
    client: aws_sdk_s3::Client,
}

impl AwsObjectStore {
    /// Loads credentials from the default AWS provider chain for `region`.
    pub fn connect(region: &str) -> Result<Self> {
        let runtime = BackgroundRuntime::new("s3", 2)?;
        let region = Region::new(region.to_string());
        let config = runtime.run(
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(region.clone())
                .load(),
        )?;
        info!("s3 client configured for region {region}");
        Ok(Self {
            client: aws_sdk_s3::Client::new(&config),
            runtime,
        })
    }
}

impl ObjectStore for AwsObjectStore {
    fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let head = self
            .runtime
            .run(self.client.head_object().bucket(bucket).key(key).send())?;
        match head {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(BrokerError::transport(format!(
                "head s3://{bucket}/{key}: {}",
                DisplayErrorContext(&err)
            ))),
        }
    }

    fn put(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.runtime
            .run(
                self.client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(body))
                    .send(),
            )?
            .map(|_| ())
            .map_err(|err| {
                BrokerError::transport(format!(
                    "put s3://{bucket}/{key}: {}",
                    DisplayErrorContext(&err)
                ))
            })
    }
}

struct Uploader {
    store: Arc<dyn ObjectStore>,
    expander: Arc<MacroExpander>,
}

impl Uploader {
    fn upload(&self, message: &ProtocolMessage) -> Result<()> {
        let Address::S3(addr) = message.address() else {
            return Err(wrong_message(Protocol::S3, message));
        };
        let payload = message.payload();

        if !(payload.is_batch() && addr.batch_payload_expansion) {
            return self.upload_one(addr, &addr.key, payload.serialize().into_owned());
        }

        let mut failed = Vec::new();
        for item in payload.items() {
            let key = self.expander.expand(&addr.key_template, Some(item));
            if let Err(e) = self.upload_one(addr, &key, item.serialize().into_owned()) {
                error!("{e}");
                failed.push(key);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::transport(format!(
                "batch upload to bucket {} failed for keys: {}",
                addr.bucket,
                failed.join(", ")
            )))
        }
    }

    fn upload_one(&self, addr: &S3Address, key: &str, body: Vec<u8>) -> Result<()> {
        if !addr.overwrite && self.store.exists(&addr.bucket, key)? {
            debug!("s3://{}/{key} exists, skipping upload", addr.bucket);
            return Ok(());
        }
        self.store.put(&addr.bucket, key, body).inspect_err(|e| {
            error!("{e}");
        })?;
        debug!("uploaded s3://{}/{key}", addr.bucket);
        Ok(())
    }
}

/// Uploads serialized payloads to S3 buckets.
pub struct S3Client {
    registry: SubscriptionRegistry,
    uploader: Arc<Uploader>,
    queue: MultiWorkerJobQueue<Arc<ProtocolMessage>>,
}

impl S3Client {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        expander: Arc<MacroExpander>,
        workers: usize,
    ) -> Result<Self> {
        let uploader = Arc::new(Uploader { store, expander });
        let queue = MultiWorkerJobQueue::new("s3", workers);
        let worker_uploader = uploader.clone();
        queue.set_processor(move |message: &Arc<ProtocolMessage>| {
            worker_uploader.upload(message)
        });
        queue.start()?;
        Ok(Self {
            registry: SubscriptionRegistry::new(),
            uploader,
            queue,
        })
    }
}

impl ProtocolClient for S3Client {
    fn protocol(&self) -> Protocol {
        Protocol::S3
    }

    fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn publish(&self, message: &ProtocolMessage) -> Result<()> {
        self.uploader.upload(message)
    }

    fn publish_async(&self, message: Arc<ProtocolMessage>, handler: CompletionHandler) {
        self.queue.enqueue(
            message,
            Some(Box::new(move |message, result| {
                handler(Protocol::S3.as_str(), &message, result.is_ok())
            })),
        );
    }

    fn flush(&self) {
        self.queue.wait_idle();
    }
}

impl Drop for S3Client {
    fn drop(&mut self) {
        self.queue.wait_idle();
        self.queue.stop();
    }
}
