//! Bounded in-memory queues for inter-thread communication.
//!
//! - [`fifo`]: power-of-two byte ring buffers, single-threaded
//!   ([`ByteFifo`]) or one-producer/one-consumer ([`AtomicByteFifo`]).
//! - [`spsc`]: lock-free single-producer/single-consumer object queue with
//!   in-place construction and cache-line separated cursors.
//! - [`slot`]: one-producer/one-consumer queue of heap-boxed elements
//!   handed over through atomic pointer slots.
//! - [`queue`]: the [`BoundedQueue`] contract and a mutex-guarded
//!   implementation.
//! - [`pool`]: a chain of worker threads that forwards tasks downstream
//!   while the next worker keeps up.
//!
//! Blocking variants of push/pop take a [`WaitStrategy`] and a [`Timeout`].
//! Build with `--features tracing` and call [`init_tracing`] for logs from
//! the worker pool.

pub mod cache;
pub mod error;
pub mod fifo;
pub mod pool;
pub mod queue;
pub mod slot;
pub mod spsc;
pub mod topology;
pub mod wait;

mod trace;

pub use error::CapacityError;
pub use fifo::{AtomicByteFifo, ByteConsumer, ByteFifo, ByteProducer};
pub use pool::{
    BalancePolicy, Discard, PoolConfig, PoolError, TaskHandler, WorkerPool, WorkerSnapshot,
};
pub use queue::{BoundedQueue, InitError, MutexQueue};
pub use topology::{CpuConfig, CpuTopology};
pub use trace::init_tracing;
pub use wait::{Timeout, WaitStrategy};
