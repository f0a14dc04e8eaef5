//! Chained worker pool with forward-on-underload balancing.
//!
//! `N` worker threads each own one bounded queue. Producers submit to queue
//! 0 only. A worker that pops a task looks at the next worker's queue: if it
//! holds at most `threshold` tasks the task moves on, otherwise it runs
//! here. The last worker always runs what it pops. Work therefore spreads
//! down the chain while downstream workers have room and stays upstream
//! once they fall behind.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use boundq::{PoolConfig, WorkerPool};
//!
//! let done = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&done);
//! let pool = WorkerPool::new(PoolConfig::new(2, 16), move |_task: u32, _worker: usize| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! })
//! .unwrap();
//!
//! for task in 0..8 {
//!     let mut task = task;
//!     while let Err(back) = pool.push_task(task) {
//!         task = back;
//!         std::thread::yield_now();
//!     }
//! }
//! while done.load(Ordering::Relaxed) < 8 {
//!     std::thread::yield_now();
//! }
//! assert!(pool.shutdown().is_empty());
//! ```

mod config;
mod worker;

use std::io;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::queue::ArrayQueue;
use thiserror::Error;

use crate::cache::CachePadded;
use crate::error::CapacityError;
use crate::queue::BoundedQueue;
use crate::topology::pin_to_core;
use crate::trace::{debug, error, info, warn};
use crate::wait::WaitStrategy;

pub use config::{BalancePolicy, PoolConfig};
use worker::Worker;

/// Executes tasks on behalf of the pool.
///
/// Implemented for every `Fn(T, usize)` closure; the second argument is the
/// index of the worker running the task.
pub trait TaskHandler<T>: Send + Sync + 'static {
    fn process(&self, task: T, worker: usize);
}

impl<T, F> TaskHandler<T> for F
where
    F: Fn(T, usize) + Send + Sync + 'static,
{
    #[inline]
    fn process(&self, task: T, worker: usize) {
        self(task, worker);
    }
}

/// Handler that drops every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl<T> TaskHandler<T> for Discard {
    #[inline]
    fn process(&self, task: T, _worker: usize) {
        drop(task);
    }
}

/// Failure to start a [`WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("invalid queue capacity: {0}")]
    Capacity(#[from] CapacityError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Per-worker counters, written only by the owning worker.
#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    forwarded: AtomicU64,
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSnapshot {
    pub worker: usize,
    /// Tasks this worker ran through the handler.
    pub processed: u64,
    /// Tasks this worker handed to the next one.
    pub forwarded: u64,
    /// Tasks waiting in this worker's queue.
    pub queued: usize,
}

/// State shared between the pool handle and its workers.
struct Shared<T, Q> {
    queues: Box<[Q]>,
    counters: Box<[CachePadded<WorkerCounters>]>,
    running: AtomicBool,
    threshold: usize,
    idle: WaitStrategy,
    _task: PhantomData<fn(T) -> T>,
}

/// A fixed chain of worker threads fed through the first worker's queue.
///
/// Dropping the pool stops and joins the workers; tasks still queued are
/// dropped. Use [`shutdown`](Self::shutdown) to get them back instead.
pub struct WorkerPool<T, Q = ArrayQueue<T>> {
    shared: Arc<Shared<T, Q>>,
    handles: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Starts a pool backed by crossbeam [`ArrayQueue`]s.
    ///
    /// # Errors
    ///
    /// See [`with_queues`](Self::with_queues).
    pub fn new<H: TaskHandler<T>>(config: PoolConfig, handler: H) -> Result<Self, PoolError> {
        Self::with_queues(config, handler)
    }
}

impl<T, Q> WorkerPool<T, Q>
where
    T: Send + 'static,
    Q: BoundedQueue<T> + 'static,
{
    /// Starts `config.workers` threads, each with a queue of type `Q`.
    ///
    /// # Errors
    ///
    /// [`PoolError::NoWorkers`] for zero workers, [`PoolError::Capacity`]
    /// if the queues cannot be built, [`PoolError::Spawn`] if the OS
    /// refuses a thread. Workers already started are stopped and joined
    /// before the error is returned.
    pub fn with_queues<H: TaskHandler<T>>(
        config: PoolConfig,
        handler: H,
    ) -> Result<Self, PoolError> {
        let workers = config.workers;
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let queues = (0..workers)
            .map(|_| Q::with_capacity(config.queue_capacity))
            .collect::<Result<Box<[Q]>, _>>()?;
        let threshold = config.balance.threshold(config.queue_capacity, workers);

        info!(
            workers,
            queue_capacity = config.queue_capacity,
            threshold,
            "starting worker pool"
        );

        let shared = Arc::new(Shared {
            queues,
            counters: (0..workers)
                .map(|_| CachePadded::new(WorkerCounters::default()))
                .collect(),
            running: AtomicBool::new(true),
            threshold,
            idle: config.idle,
            _task: PhantomData,
        });
        let handler = Arc::new(handler);

        let mut pool = Self {
            shared,
            handles: Vec::with_capacity(workers),
        };

        for (id, core) in config.cpu.resolve(workers).into_iter().enumerate() {
            let worker = Worker::new(id, Arc::clone(&pool.shared), Arc::clone(&handler));
            debug!(worker = id, core = ?core, "spawning worker");

            // On failure `pool` drops here, which stops and joins the
            // workers spawned so far.
            let handle = thread::Builder::new()
                .name(format!("{}-{id}", config.thread_name))
                .spawn(move || {
                    if let Some(core) = core
                        && !pin_to_core(core)
                    {
                        warn!(worker = id, core, "failed to pin worker to core");
                    }
                    worker.run();
                })
                .map_err(PoolError::Spawn)?;
            pool.handles.push(handle);
        }

        Ok(pool)
    }

    /// Submits a task to the first worker's queue.
    ///
    /// # Errors
    ///
    /// Returns `Err(task)` if that queue is full.
    #[inline]
    pub fn push_task(&self, task: T) -> Result<(), T> {
        self.shared.queues[0].push_back(task)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.shared.queues.len()
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.shared.queues[0].capacity()
    }

    /// Downstream occupancy at or below which tasks are forwarded.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.shared.threshold
    }

    /// Tasks currently waiting across all queues.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queues.iter().map(|queue| queue.used_size()).sum()
    }

    /// Per-worker counters and queue occupancy.
    #[must_use]
    pub fn stats(&self) -> Vec<WorkerSnapshot> {
        self.shared
            .queues
            .iter()
            .zip(self.shared.counters.iter())
            .enumerate()
            .map(|(worker, (queue, counters))| WorkerSnapshot {
                worker,
                processed: counters.processed.load(Ordering::Relaxed),
                forwarded: counters.forwarded.load(Ordering::Relaxed),
                queued: queue.used_size(),
            })
            .collect()
    }

    /// Stops and joins every worker, then returns the tasks nobody ran,
    /// in queue order from the first worker to the last.
    pub fn shutdown(mut self) -> Vec<T> {
        self.stop();
        let mut leftover = Vec::new();
        for queue in &self.shared.queues {
            while let Some(task) = queue.pop_front() {
                leftover.push(task);
            }
        }
        if !leftover.is_empty() {
            debug!(count = leftover.len(), "collected unprocessed tasks");
        }
        leftover
    }
}

impl<T, Q> WorkerPool<T, Q> {
    /// Clears the running flag and joins every worker. Idempotent.
    fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        info!(workers = self.handles.len(), "stopping worker pool");
        self.shared.running.store(false, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked");
            }
        }
    }
}

impl<T, Q> Drop for WorkerPool<T, Q> {
    fn drop(&mut self) {
        self.stop();
    }
}
