//! Bounded queue contract used by the worker pool.
//!
//! The pool does not care how its per-worker queues are built, only that
//! they are bounded, shareable between threads and report their occupancy.
//! [`ArrayQueue`] from crossbeam is the default; [`MutexQueue`] serializes
//! every operation behind a single lock.

mod mutex;

use crossbeam::queue::ArrayQueue;

use crate::error::CapacityError;

pub use mutex::{InitError, MutexQueue};

/// A fixed-capacity FIFO that any number of threads may push to and pop from.
pub trait BoundedQueue<T>: Send + Sync + Sized {
    /// Builds an initialized queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::Zero`] for a zero capacity.
    fn with_capacity(capacity: usize) -> Result<Self, CapacityError>;

    /// Appends an item, handing it back if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` when there is no room.
    fn push_back(&self, item: T) -> Result<(), T>;

    /// Removes the oldest item.
    fn pop_front(&self) -> Option<T>;

    /// Current number of items.
    fn used_size(&self) -> usize;

    fn capacity(&self) -> usize;
}

impl<T: Send> BoundedQueue<T> for ArrayQueue<T> {
    fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        let capacity = CapacityError::check_min(capacity, 1)?;
        Ok(ArrayQueue::new(capacity))
    }

    #[inline]
    fn push_back(&self, item: T) -> Result<(), T> {
        self.push(item)
    }

    #[inline]
    fn pop_front(&self) -> Option<T> {
        self.pop()
    }

    #[inline]
    fn used_size(&self) -> usize {
        self.len()
    }

    fn capacity(&self) -> usize {
        ArrayQueue::capacity(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise<Q: BoundedQueue<u32>>() {
        assert!(matches!(Q::with_capacity(0), Err(CapacityError::Zero)));

        let queue = Q::with_capacity(3).unwrap();
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.used_size(), 0);
        for i in 0..3 {
            assert_eq!(queue.push_back(i), Ok(()));
        }
        assert_eq!(queue.push_back(3), Err(3));
        assert_eq!(queue.used_size(), 3);
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.push_back(3), Ok(()));
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), Some(3));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn array_queue_honours_contract() {
        exercise::<ArrayQueue<u32>>();
    }

    #[test]
    fn mutex_queue_honours_contract() {
        exercise::<MutexQueue<u32>>();
    }
}
