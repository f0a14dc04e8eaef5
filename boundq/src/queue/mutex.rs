//! Mutex-guarded bounded queue with explicit one-time initialization.
//!
//! Every operation takes the same lock. Using the queue before
//! [`MutexQueue::initialize`] is not an error: pushes are rejected, pops
//! return nothing and the reported size is zero.

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;

use super::BoundedQueue;
use crate::error::CapacityError;

/// Failure to initialize a [`MutexQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// `initialize` was already called successfully.
    #[error("queue is already initialized")]
    AlreadyInitialized,
    /// The requested capacity is unusable.
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

struct Bounded<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Bounded FIFO serialized behind a single [`parking_lot::Mutex`].
pub struct MutexQueue<T> {
    inner: Mutex<Option<Bounded<T>>>,
}

impl<T> Default for MutexQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MutexQueue<T> {
    /// Creates an uninitialized queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Allocates room for `capacity` items. Only the first successful call
    /// takes effect.
    ///
    /// # Errors
    ///
    /// [`InitError::AlreadyInitialized`] on a repeat call,
    /// [`InitError::Capacity`] for a zero capacity.
    pub fn initialize(&self, capacity: usize) -> Result<(), InitError> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        let capacity = CapacityError::check_min(capacity, 1)?;
        *inner = Some(Bounded {
            items: VecDeque::with_capacity(capacity),
            capacity,
        });
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Appends an item.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full or not initialized.
    pub fn push_back(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        match inner.as_mut() {
            Some(queue) if queue.items.len() < queue.capacity => {
                queue.items.push_back(item);
                Ok(())
            }
            _ => Err(item),
        }
    }

    /// Removes the oldest item; `None` if empty or not initialized.
    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().as_mut()?.items.pop_front()
    }

    /// Current number of items; 0 if not initialized.
    #[must_use]
    pub fn used_size(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |queue| queue.items.len())
    }

    /// Configured capacity; 0 if not initialized.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |queue| queue.capacity)
    }
}

impl<T: Send> BoundedQueue<T> for MutexQueue<T> {
    fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        let capacity = CapacityError::check_min(capacity, 1)?;
        Ok(Self {
            inner: Mutex::new(Some(Bounded {
                items: VecDeque::with_capacity(capacity),
                capacity,
            })),
        })
    }

    fn push_back(&self, item: T) -> Result<(), T> {
        MutexQueue::push_back(self, item)
    }

    fn pop_front(&self) -> Option<T> {
        MutexQueue::pop_front(self)
    }

    fn used_size(&self) -> usize {
        MutexQueue::used_size(self)
    }

    fn capacity(&self) -> usize {
        MutexQueue::capacity(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn uninitialized_queue_is_a_permissive_no_op() {
        let queue = MutexQueue::<u32>::new();
        assert!(!queue.is_initialized());
        assert_eq!(queue.push_back(1), Err(1));
        assert_eq!(queue.pop_front(), None);
        assert_eq!(queue.used_size(), 0);
        assert_eq!(queue.capacity(), 0);
    }

    #[test]
    fn initialize_only_once() {
        let queue = MutexQueue::<u32>::new();
        assert_eq!(queue.initialize(4), Ok(()));
        assert!(queue.is_initialized());
        assert_eq!(queue.initialize(8), Err(InitError::AlreadyInitialized));
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn failed_initialize_can_be_retried() {
        let queue = MutexQueue::<u32>::new();
        assert_eq!(
            queue.initialize(0),
            Err(InitError::Capacity(CapacityError::Zero))
        );
        assert!(!queue.is_initialized());
        assert_eq!(queue.initialize(2), Ok(()));
    }

    #[test]
    fn many_producers_one_consumer() {
        const PER_THREAD: u64 = 10_000;
        let queue = Arc::new(MutexQueue::<u64>::new());
        queue.initialize(64).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let mut item = t * PER_THREAD + i + 1;
                        while let Err(back) = queue.push_back(item) {
                            item = back;
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let total_items = 4 * PER_THREAD;
        let mut sum = 0u64;
        let mut seen = 0u64;
        while seen < total_items {
            match queue.pop_front() {
                Some(v) => {
                    sum += v;
                    seen += 1;
                }
                None => std::thread::yield_now(),
            }
        }
        for handle in producers {
            handle.join().unwrap();
        }
        assert_eq!(sum, total_items * (total_items + 1) / 2);
        assert_eq!(queue.used_size(), 0);
    }
}
