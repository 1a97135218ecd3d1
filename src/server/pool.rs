//! Bounded worker pools
//!
//! Two pools live here. [`ProcessorPool`] is the admission-control mechanism:
//! a condition-variable-guarded deque of request processors registered under
//! one path, so a path with N processors serves at most N requests at once
//! and excess requests wait. [`DispatchPool`] is the fixed set of threads
//! that run one dispatch task per accepted connection.

use super::processor::RequestProcessor;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Bounded, blocking pool of request processors for one path
pub struct ProcessorPool {
    workers: Mutex<VecDeque<Box<dyn RequestProcessor>>>,
    available: Condvar,
}

impl ProcessorPool {
    /// Create an empty pool
    pub fn new() -> Self {
        ProcessorPool {
            workers: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Add a worker, raising the path's concurrency limit by one
    pub fn add(&self, worker: Box<dyn RequestProcessor>) {
        self.workers.lock().unwrap().push_back(worker);
        self.available.notify_one();
    }

    /// Borrow a worker, waiting up to `wait` for one to become available
    pub fn borrow(&self, wait: Duration) -> Option<Box<dyn RequestProcessor>> {
        let mut workers = self.workers.lock().unwrap();
        let deadline = Instant::now() + wait;
        loop {
            if let Some(worker) = workers.pop_front() {
                return Some(worker);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(workers, deadline - now)
                .unwrap();
            workers = guard;
        }
    }

    /// Return a borrowed worker, waking one waiter
    pub fn restore(&self, worker: Box<dyn RequestProcessor>) {
        self.workers.lock().unwrap().push_back(worker);
        self.available.notify_one();
    }

    /// Workers currently available (not borrowed)
    pub fn available_workers(&self) -> usize {
        self.workers.lock().unwrap().len()
    }
}

impl Default for ProcessorPool {
    fn default() -> Self {
        Self::new()
    }
}

/// The wildcard path, matched when no exact registration exists
pub const WILDCARD_PATH: &str = "*";

/// Processor pools keyed by exact request path
///
/// The request URI is matched verbatim; the only fallback is the `*`
/// wildcard pool.
pub struct PathPools {
    pools: Mutex<HashMap<String, Arc<ProcessorPool>>>,
}

impl PathPools {
    /// Create an empty map
    pub fn new() -> Self {
        PathPools {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Register a worker under a path
    ///
    /// Repeated registrations for the same path grow that path's pool.
    pub fn register(&self, path: impl Into<String>, worker: Box<dyn RequestProcessor>) {
        let mut pools = self.pools.lock().unwrap();
        pools
            .entry(path.into())
            .or_insert_with(|| Arc::new(ProcessorPool::new()))
            .add(worker);
    }

    /// Pool for a request path: exact match, else the wildcard
    pub fn resolve(&self, path: &str) -> Option<Arc<ProcessorPool>> {
        let pools = self.pools.lock().unwrap();
        pools
            .get(path)
            .or_else(|| pools.get(WILDCARD_PATH))
            .map(Arc::clone)
    }
}

impl Default for PathPools {
    fn default() -> Self {
        Self::new()
    }
}

type Job = Box<dyn FnOnce() + Send>;

/// Fixed-size thread pool for dispatch tasks
///
/// Jobs flow over a channel; `shutdown` closes the channel, waits up to the
/// given bound for in-flight and queued jobs to finish, and detaches any
/// workers still busy after that. Threads cannot be killed, so detaching with
/// a warning is the forced-termination path; the closed channel makes the
/// stragglers exit after their current connection.
pub struct DispatchPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    /// Jobs submitted but not yet finished
    active: Arc<(Mutex<usize>, Condvar)>,
}

impl DispatchPool {
    /// Spawn `workers` dispatch threads
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let active = Arc::new((Mutex::new(0usize), Condvar::new()));

        let handles = (0..workers.max(1))
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                let active = Arc::clone(&active);
                thread::Builder::new()
                    .name(format!("dispatch-{}", i))
                    .spawn(move || Self::worker_loop(receiver, active))
                    .expect("failed to spawn dispatch worker")
            })
            .collect();

        DispatchPool {
            sender: Some(sender),
            handles,
            active,
        }
    }

    fn worker_loop(receiver: Arc<Mutex<Receiver<Job>>>, active: Arc<(Mutex<usize>, Condvar)>) {
        loop {
            let job = {
                let receiver = receiver.lock().unwrap();
                receiver.recv()
            };
            match job {
                Ok(job) => {
                    // The count must drop and the thread must survive even
                    // when the job unwinds
                    let outcome = panic::catch_unwind(AssertUnwindSafe(job));
                    let (count, finished) = &*active;
                    *count.lock().unwrap() -= 1;
                    finished.notify_all();
                    if outcome.is_err() {
                        tracing::error!("dispatch job panicked");
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Submit a job; false if the pool is shut down
    pub fn execute(&self, job: Job) -> bool {
        match &self.sender {
            Some(sender) => {
                *self.active.0.lock().unwrap() += 1;
                if sender.send(job).is_err() {
                    *self.active.0.lock().unwrap() -= 1;
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Shut down, waiting up to `wait` for outstanding jobs
    pub fn shutdown(&mut self, wait: Duration) {
        self.sender.take();

        let (count, finished) = &*self.active;
        let mut outstanding = count.lock().unwrap();
        let deadline = Instant::now() + wait;
        while *outstanding > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = finished.wait_timeout(outstanding, deadline - now).unwrap();
            outstanding = guard;
        }
        let drained = *outstanding == 0;
        drop(outstanding);

        if drained {
            for handle in self.handles.drain(..) {
                let _ = handle.join();
            }
        } else {
            tracing::warn!(
                workers = self.handles.len(),
                "dispatch pool did not drain before deadline, detaching workers"
            );
            self.handles.clear();
        }
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.shutdown(Duration::from_secs(0));
        }
    }
}
