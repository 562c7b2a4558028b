use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{info, warn};

use super::{Job, JobCallback, Processor};
use crate::utils::{BrokerError, Result};

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 4;

struct State<T> {
    jobs: VecDeque<Job<T>>,
    in_flight: usize,
    stopped: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        self.cond.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

/// Bounded pool of workers fed from one FIFO queue.
///
/// Each idle worker blocks on the queue's condition variable, so no more than
/// `workers` jobs run at once and jobs start in enqueue order.
pub struct MultiWorkerJobQueue<T: Send + 'static> {
    name: String,
    workers: usize,
    shared: Arc<Shared<T>>,
    processor: Mutex<Option<Processor<T>>>,
    handles: Mutex<Vec<(JoinHandle<()>, ThreadId)>>,
}

impl<T: Send + 'static> MultiWorkerJobQueue<T> {
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers: workers.max(1),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    jobs: VecDeque::new(),
                    in_flight: 0,
                    stopped: false,
                }),
                cond: Condvar::new(),
            }),
            processor: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Installs the task body. Must be called before `start`.
    pub fn set_processor<F>(&self, processor: F)
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        let mut slot = self.processor.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::new(processor));
    }

    /// Spawns the worker pool. Calling `start` again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if !handles.is_empty() {
            return Ok(());
        }
        let processor = self
            .processor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| {
                BrokerError::invalid(format!("queue '{}' has no processor", self.name))
            })?;

        for n in 0..self.workers {
            let shared = self.shared.clone();
            let processor = processor.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-worker-{n}", self.name))
                .spawn(move || worker_loop(shared, processor))?;
            let id = handle.thread().id();
            handles.push((handle, id));
        }
        info!(
            "job queue '{}' started with {} workers",
            self.name, self.workers
        );
        Ok(())
    }

    /// Appends a job. Returns `false` if the queue has been stopped, in which
    /// case the callback runs immediately with a transport error.
    pub fn enqueue(&self, data: T, callback: Option<JobCallback<T>>) -> bool {
        let mut state = self.shared.lock();
        if state.stopped {
            drop(state);
            warn!("job queue '{}' is stopped; rejecting job", self.name);
            if let Some(callback) = callback {
                callback(
                    data,
                    Err(BrokerError::transport(format!(
                        "job queue '{}' is stopped",
                        self.name
                    ))),
                );
            }
            return false;
        }
        state.jobs.push_back(Job::new(data, callback));
        self.shared.cond.notify_all();
        true
    }

    /// Blocks until the queue is empty and every worker is idle.
    pub fn wait_idle(&self) {
        let started = !self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty();
        let mut state = self.shared.lock();
        while started && !state.stopped && (state.in_flight > 0 || !state.jobs.is_empty()) {
            state = self.shared.wait(state);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    pub fn len(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the pool, letting in-flight jobs finish. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            if !state.stopped {
                state.stopped = true;
                if !state.jobs.is_empty() {
                    warn!(
                        "job queue '{}' stopping with {} pending jobs",
                        self.name,
                        state.jobs.len()
                    );
                }
            }
            self.shared.cond.notify_all();
        }

        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if handles.is_empty() {
            return;
        }
        let current = thread::current().id();
        for (handle, id) in handles {
            if id != current && handle.join().is_err() {
                warn!("job queue '{}' worker panicked", self.name);
            }
        }
        info!("job queue '{}' stopped", self.name);
    }
}

impl<T: Send + 'static> Drop for MultiWorkerJobQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<T: Send + 'static>(shared: Arc<Shared<T>>, processor: Processor<T>) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.stopped {
                    return;
                }
                if let Some(job) = state.jobs.pop_front() {
                    state.in_flight += 1;
                    break job;
                }
                state = shared.wait(state);
            }
        };

        job.run(&processor);

        let mut state = shared.lock();
        state.in_flight -= 1;
        shared.cond.notify_all();
    }
}
