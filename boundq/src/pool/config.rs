//! Worker pool configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::topology::CpuConfig;
use crate::wait::WaitStrategy;

/// How full the next worker's queue may be before a task stops being
/// forwarded to it.
///
/// A worker forwards a task downstream when the next queue holds at most
/// `queue_capacity / divisor` tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BalancePolicy {
    /// Divisor 2: forward while the next queue is at most half full.
    #[default]
    Half,
    /// Divisor equal to the number of workers.
    PerWorker,
    /// Explicit divisor.
    Divisor(NonZeroUsize),
}

impl BalancePolicy {
    /// Occupancy at or below which a downstream queue accepts forwarded tasks.
    #[must_use]
    pub fn threshold(self, queue_capacity: usize, workers: usize) -> usize {
        let divisor = match self {
            Self::Half => 2,
            Self::PerWorker => workers.max(1),
            Self::Divisor(d) => d.get(),
        };
        queue_capacity / divisor
    }
}

/// Configuration for a [`WorkerPool`](super::WorkerPool).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, one queue each.
    pub workers: usize,
    /// Capacity of every per-worker queue.
    pub queue_capacity: usize,
    /// Forwarding threshold.
    pub balance: BalancePolicy,
    /// What an idle worker does before polling its queue again.
    pub idle: WaitStrategy,
    /// CPU pinning of worker threads.
    pub cpu: CpuConfig,
    /// Thread name prefix; workers are named `<prefix>-<id>`.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: 1024,
            balance: BalancePolicy::Half,
            idle: WaitStrategy::Sleep(Duration::from_millis(1)),
            cpu: CpuConfig::Disabled,
            thread_name: "boundq-worker".into(),
        }
    }
}

impl PoolConfig {
    /// Config with `workers` threads and `queue_capacity` slots per queue,
    /// everything else default.
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers,
            queue_capacity,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_balance(mut self, balance: BalancePolicy) -> Self {
        self.balance = balance;
        self
    }

    #[must_use]
    pub fn with_idle(mut self, idle: WaitStrategy) -> Self {
        self.idle = idle;
        self
    }

    #[must_use]
    pub fn with_cpu(mut self, cpu: CpuConfig) -> Self {
        self.cpu = cpu;
        self
    }

    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
