//! Worker thread loop and forwarding policy.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::{Shared, TaskHandler};
use crate::queue::BoundedQueue;
use crate::trace::trace;

/// One pool worker, bound to the queue with the same index.
pub(super) struct Worker<T, Q, H> {
    id: usize,
    shared: Arc<Shared<T, Q>>,
    handler: Arc<H>,
}

impl<T, Q, H> Worker<T, Q, H>
where
    Q: BoundedQueue<T>,
    H: TaskHandler<T>,
{
    pub(super) fn new(id: usize, shared: Arc<Shared<T, Q>>, handler: Arc<H>) -> Self {
        Self {
            id,
            shared,
            handler,
        }
    }

    /// Polls the worker's queue until the pool stops running.
    ///
    /// Tasks still queued when the flag clears are left for the pool to
    /// collect.
    pub(super) fn run(&self) {
        let queue = &self.shared.queues[self.id];
        while self.shared.running.load(Ordering::Relaxed) {
            match queue.pop_front() {
                Some(task) => self.dispatch(task),
                None => self.shared.idle.idle(),
            }
        }
    }

    /// Hands `task` to the next worker if its queue is under the threshold,
    /// otherwise executes it here.
    fn dispatch(&self, task: T) {
        let counters = &self.shared.counters[self.id];
        let task = match self.shared.queues.get(self.id + 1) {
            Some(next) if next.used_size() <= self.shared.threshold => {
                match next.push_back(task) {
                    Ok(()) => {
                        counters.forwarded.fetch_add(1, Ordering::Relaxed);
                        trace!(worker = self.id, to = self.id + 1, "task forwarded");
                        return;
                    }
                    // Filled up since the size check; run it locally.
                    Err(task) => task,
                }
            }
            _ => task,
        };

        self.handler.process(task, self.id);
        counters.processed.fetch_add(1, Ordering::Relaxed);
    }
}
