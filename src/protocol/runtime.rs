//! Tokio runtime owned by a client that exposes a blocking API.
//!
//! Futures are spawned onto the runtime's own workers and the calling thread
//! waits on the join handle with `futures::executor::block_on`, so blocking
//! calls are valid from plain threads and from inside another tokio runtime.

use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::utils::{BrokerError, Result};

pub(crate) struct BackgroundRuntime {
    name: String,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl BackgroundRuntime {
    pub(crate) fn new(name: &str, workers: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name(format!("edgebus-{name}"))
            .enable_all()
            .build()?;
        Ok(Self {
            name: name.to_string(),
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs `future` on the runtime and blocks the caller until it finishes.
    pub(crate) fn run<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        futures::executor::block_on(self.spawn(future))
            .map_err(|e| BrokerError::transport(format!("{} task failed: {e}", self.name)))
    }
}

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        // dropping a runtime blocks, which tokio forbids inside async contexts
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
