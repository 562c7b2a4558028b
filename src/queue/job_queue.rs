use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, info, warn};

use super::{Job, JobCallback, Processor};
use crate::utils::{BrokerError, Result};

struct State<T> {
    jobs: VecDeque<Job<T>>,
    paused: bool,
    running: bool,
    stopped: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
    processor: Mutex<Option<Processor<T>>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State<T>>) -> MutexGuard<'a, State<T>> {
        self.cond.wait(guard).unwrap_or_else(|e| e.into_inner())
    }
}

/// Single-worker FIFO job queue.
///
/// One background thread processes jobs strictly in enqueue order and runs
/// each job's callback before picking up the next one.
pub struct JobQueue<T: Send + 'static> {
    name: String,
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<(JoinHandle<()>, ThreadId)>>,
}

impl<T: Send + 'static> JobQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    jobs: VecDeque::new(),
                    paused: false,
                    running: false,
                    stopped: false,
                }),
                cond: Condvar::new(),
                processor: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Installs the task body. Takes effect for the next dequeued job.
    pub fn set_processor<F>(&self, processor: F)
    where
        F: Fn(&T) -> Result<()> + Send + Sync + 'static,
    {
        let mut slot = self.shared.processor.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::new(processor));
    }

    /// Spawns the worker thread. Calling `start` on a running queue is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() {
            return Ok(());
        }
        let has_processor = self
            .shared
            .processor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        if !has_processor {
            return Err(BrokerError::invalid(format!(
                "queue '{}' has no processor",
                self.name
            )));
        }

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-worker", self.name))
            .spawn(move || worker_loop(shared))?;
        let id = handle.thread().id();
        *worker = Some((handle, id));
        info!("job queue '{}' started", self.name);
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

    /// Waits for the in-flight job, then keeps new jobs from starting.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        state.paused = true;
        while state.running {
            state = self.shared.wait(state);
        }
        debug!("job queue '{}' paused", self.name);
    }

    pub fn resume(&self) {
        let mut state = self.shared.lock();
        state.paused = false;
        self.shared.cond.notify_all();
        debug!("job queue '{}' resumed", self.name);
    }

    /// Discards every job that has not started. Their callbacks never run.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.lock();
        let dropped = state.jobs.len();
        state.jobs.clear();
        self.shared.cond.notify_all();
        dropped
    }

    /// Blocks until the queue is empty and no job is running.
    ///
    /// Returns immediately when the queue is paused, stopped or was never
    /// started, since nothing would drain it.
    pub fn wait_idle(&self) {
        let started = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some();
        let mut state = self.shared.lock();
        while started && !state.stopped && !state.paused && (state.running || !state.jobs.is_empty())
        {
            state = self.shared.wait(state);
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops and joins the worker. Idempotent; jobs not yet started are dropped.
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

        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some((handle, id)) = worker {
            // a callback may drop the owner on the worker thread itself
            if id != thread::current().id() && handle.join().is_err() {
                warn!("job queue '{}' worker panicked", self.name);
            }
            info!("job queue '{}' stopped", self.name);
        }
    }
}

impl<T: Send + 'static> Drop for JobQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop<T: Send + 'static>(shared: Arc<Shared<T>>) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.stopped {
                    return;
                }
                if !state.paused && !state.jobs.is_empty() {
                    break;
                }
                state = shared.wait(state);
            }
            state.running = true;
            state.jobs.pop_front()
        };

        let processor = shared
            .processor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let (Some(job), Some(processor)) = (job, processor) {
            job.run(&processor);
        }

        let mut state = shared.lock();
        state.running = false;
        shared.cond.notify_all();
    }
}
