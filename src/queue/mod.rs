//! The `queue` module provides the asynchronous job runners used by protocol
//! clients that must not block their callers on publish.
//!
//! - [`JobQueue`] runs one job at a time on a dedicated worker thread. Jobs
//!   and their callbacks complete in enqueue order.
//! - [`MultiWorkerJobQueue`] runs up to `workers` jobs concurrently. Jobs
//!   start in enqueue order; completion order is not guaranteed.

pub mod job_queue;
pub mod multi_worker;

pub use job_queue::JobQueue;
pub use multi_worker::MultiWorkerJobQueue;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error};

use crate::utils::{BrokerError, Result};

/// Task body installed with `set_processor`.
pub type Processor<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Completion callback receiving the job data back together with the
/// processor's result.
pub type JobCallback<T> = Box<dyn FnOnce(T, Result<()>) + Send>;

/// Data queued for asynchronous processing plus an optional completion callback.
pub struct Job<T> {
    pub data: T,
    pub callback: Option<JobCallback<T>>,
}

impl<T> Job<T> {
    pub fn new(data: T, callback: Option<JobCallback<T>>) -> Self {
        Self { data, callback }
    }

    /// Runs the processor and then the callback, if any.
    ///
    /// A panicking processor counts as a failed job; a panicking callback is
    /// logged. Neither unwinds into the worker.
    pub(crate) fn run(self, processor: &Processor<T>) {
        let Job { data, callback } = self;
        let result = catch_unwind(AssertUnwindSafe(|| processor(&data))).unwrap_or_else(|_| {
            error!("job processor panicked");
            Err(BrokerError::Handler("job processor panicked".into()))
        });
        if let Err(e) = &result {
            debug!("job failed: {e}");
        }
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(data, result))).is_err() {
                error!("job callback panicked");
            }
        }
    }
}
