//! Bounded lock-free SPSC object queue.
//!
//! Elements are constructed in place in a fixed slot array and destroyed in
//! place when popped. The producer and consumer cursors sit on separate cache
//! lines, and the slot array is padded on both ends.
//!
//! # Overview
//!
//! - [`Producer`] - Write end (single producer per queue)
//! - [`Consumer`] - Read end (single consumer per queue)
//! - Lock-free: no mutexes or syscalls in the hot path
//!
//! A queue of capacity `K` holds at most `K - 1` elements; one slot is kept
//! empty to tell a full ring from an empty one. Capacity need not be a power
//! of two.
//!
//! # Example
//!
//! ```
//! use boundq::spsc;
//!
//! let (producer, mut consumer) = spsc::channel::<String>(16)?;
//!
//! producer.try_push("hello".to_string()).expect("queue full");
//! assert!(producer.try_emplace(|| "world".to_string()));
//!
//! assert_eq!(consumer.front().map(String::as_str), Some("hello"));
//! consumer.pop();
//! assert_eq!(consumer.try_pop().as_deref(), Some("world"));
//! assert!(consumer.front().is_none());
//! # Ok::<(), boundq::CapacityError>(())
//! ```
//!
//! # Blocking
//!
//! [`Producer::push`] and [`Producer::emplace`] busy-wait with no timeout.
//! [`Producer::push_blocking`] and [`Consumer::pop_blocking`] take a
//! [`WaitStrategy`] and a [`Timeout`] for environments without a spare core.

mod ring;

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::CapacityError;
use crate::wait::{self, Timeout, WaitStrategy};
use ring::Ring;

/// Smallest accepted capacity.
pub const MIN_CAPACITY: usize = 2;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the SPSC queue.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`] or [`Clone`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer` (no concurrent `push()`)
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
///
/// See [`Producer`] for thread safety details (same semantics apply).
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a new SPSC queue with `capacity` slots.
///
/// # Errors
///
/// Returns [`CapacityError`] if `capacity < 2`.
pub fn channel<T>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    let capacity = CapacityError::check_min(capacity, MIN_CAPACITY)?;
    let ring = Arc::new(Ring::new(capacity));

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    Ok((producer, consumer))
}

impl<T> Producer<T> {
    /// Attempts to push an item onto the queue.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    #[inline]
    pub fn try_push(&self, item: T) -> Result<(), T> {
        // SAFETY: Producer has exclusive access to the producer side of the ring.
        unsafe {
            match self.ring.claim() {
                Some(head) => {
                    self.ring.publish(head, item);
                    Ok(())
                }
                None => Err(item),
            }
        }
    }

    /// Constructs an element in its slot if there is space.
    ///
    /// `make` is only called once a slot has been reserved. Returns `false`
    /// (without calling `make`) if the queue is full.
    #[inline]
    pub fn try_emplace<F: FnOnce() -> T>(&self, make: F) -> bool {
        // SAFETY: Producer has exclusive access to the producer side of the ring.
        unsafe {
            match self.ring.claim() {
                Some(head) => {
                    self.ring.publish(head, make());
                    true
                }
                None => false,
            }
        }
    }

    /// Spins until space is available, then pushes. Never times out.
    #[inline]
    pub fn push(&self, mut item: T) {
        while let Err(returned) = self.try_push(item) {
            item = returned;
            std::hint::spin_loop();
        }
    }

    /// Spins until space is available, then constructs the element in place.
    #[inline]
    pub fn emplace<F: FnOnce() -> T>(&self, make: F) {
        let head = loop {
            // SAFETY: Producer has exclusive access to the producer side of the ring.
            if let Some(head) = unsafe { self.ring.claim() } {
                break head;
            }
            std::hint::spin_loop();
        };
        // SAFETY: `head` comes from the claim just above.
        unsafe { self.ring.publish(head, make()) };
    }

    /// Waits for space using `wait` between attempts, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` on timeout.
    pub fn push_blocking(&self, item: T, wait: WaitStrategy, timeout: Timeout) -> Result<(), T> {
        wait::retry(item, wait, timeout, |item| self.try_push(item))
    }

    /// Number of stored elements. Approximate while the consumer runs.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T> Consumer<T> {
    /// Borrows the oldest element without removing it.
    #[inline]
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        // SAFETY: Consumer has exclusive access to the consumer side of the
        // ring. Releasing the slot needs `&mut self`, so it can't happen while
        // the returned reference is alive.
        unsafe { self.ring.front() }
    }

    /// Drops the oldest element in place.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty. Check [`front`](Self::front) first or
    /// use [`try_pop`](Self::try_pop).
    #[inline]
    pub fn pop(&mut self) {
        // SAFETY: Consumer has exclusive access to the consumer side of the ring.
        let popped = unsafe { self.ring.discard() };
        assert!(popped, "pop called on an empty queue");
    }

    /// Moves the oldest element out, or returns `None` if empty.
    #[inline]
    #[must_use]
    pub fn try_pop(&mut self) -> Option<T> {
        // SAFETY: Consumer has exclusive access to the consumer side of the ring.
        unsafe { self.ring.pop() }
    }

    /// Waits for an element using `wait` between attempts, up to `timeout`.
    ///
    /// Returns `None` on timeout.
    #[must_use]
    pub fn pop_blocking(&mut self, wait: WaitStrategy, timeout: Timeout) -> Option<T> {
        wait::retry((), wait, timeout, |()| self.try_pop().ok_or(())).ok()
    }

    /// Number of stored elements. Approximate while the producer runs.
    #[must_use]
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts live instances through a shared counter.
    struct Tracked {
        live: Arc<AtomicUsize>,
    }

    impl Tracked {
        fn new(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self {
                live: Arc::clone(live),
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            let before = self.live.fetch_sub(1, Ordering::SeqCst);
            assert!(before > 0, "instance dropped twice");
        }
    }

    #[test]
    fn test_capacity_below_two_rejected() {
        assert!(matches!(channel::<u32>(0), Err(CapacityError::Zero)));
        assert!(matches!(
            channel::<u32>(1),
            Err(CapacityError::TooSmall { requested: 1, .. })
        ));
        assert!(channel::<u32>(2).is_ok());
    }

    #[test]
    fn test_basic_push_pop() {
        let (producer, mut consumer) = channel::<u64>(8).unwrap();

        assert!(producer.try_push(42).is_ok());
        assert_eq!(consumer.front(), Some(&42));
        assert_eq!(consumer.try_pop(), Some(42));
        assert_eq!(consumer.try_pop(), None);
        assert!(consumer.front().is_none());
    }

    #[test]
    fn test_holds_capacity_minus_one() {
        let (producer, mut consumer) = channel::<u32>(11).unwrap();
        assert_eq!(producer.capacity(), 11);

        for i in 0..10 {
            assert!(producer.try_push(i).is_ok(), "Failed to push item {i}");
        }
        assert_eq!(producer.size(), 10);
        assert_eq!(producer.try_push(999), Err(999));
        assert!(!producer.try_emplace(|| unreachable!("no slot reserved")));
        assert_eq!(consumer.size(), 10);

        consumer.pop();
        assert_eq!(consumer.size(), 9);
        assert!(producer.try_emplace(|| 10));
        assert_eq!(producer.try_push(1000), Err(1000));
    }

    #[test]
    fn test_fifo_order_with_wrapping() {
        let (producer, mut consumer) = channel::<u64>(5).unwrap();

        for round in 0..7 {
            for i in 0..4 {
                producer.push(round * 10 + i);
            }
            for i in 0..4 {
                assert_eq!(consumer.try_pop(), Some(round * 10 + i));
            }
            assert!(consumer.is_empty());
        }
    }

    #[test]
    #[should_panic(expected = "pop called on an empty queue")]
    fn test_pop_on_empty_panics() {
        let (_producer, mut consumer) = channel::<u32>(4).unwrap();
        consumer.pop();
    }

    #[test]
    fn test_elements_dropped_exactly_once() {
        let live = Arc::new(AtomicUsize::new(0));
        {
            let (producer, mut consumer) = channel::<Tracked>(11).unwrap();
            for _ in 0..10 {
                producer.emplace(|| Tracked::new(&live));
            }
            assert_eq!(live.load(Ordering::SeqCst), 10);
            assert!(!producer.try_emplace(|| Tracked::new(&live)));
            assert_eq!(live.load(Ordering::SeqCst), 10);

            consumer.pop();
            assert_eq!(live.load(Ordering::SeqCst), 9);
            let moved = consumer.try_pop().unwrap();
            assert_eq!(live.load(Ordering::SeqCst), 9);
            drop(moved);
            assert_eq!(live.load(Ordering::SeqCst), 8);

            while consumer.front().is_some() {
                consumer.pop();
            }
            assert_eq!(live.load(Ordering::SeqCst), 0);
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_drains_remaining_elements() {
        let live = Arc::new(AtomicUsize::new(0));
        let (producer, mut consumer) = channel::<Tracked>(8).unwrap();
        // Move the cursors off zero so the drain wraps.
        for _ in 0..5 {
            producer.push(Tracked::new(&live));
            consumer.pop();
        }
        for _ in 0..6 {
            producer.push(Tracked::new(&live));
        }
        assert_eq!(live.load(Ordering::SeqCst), 6);

        drop(producer);
        assert_eq!(live.load(Ordering::SeqCst), 6);
        drop(consumer);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    /// Counts drops and panics from the destructor when `panics` is set.
    struct PanicOnDrop {
        drops: Arc<AtomicUsize>,
        panics: bool,
    }

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
            if self.panics {
                panic!("element destructor failed");
            }
        }
    }

    #[test]
    fn test_panicking_destructor_runs_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (producer, mut consumer) = channel::<PanicOnDrop>(4).unwrap();
        producer.push(PanicOnDrop {
            drops: Arc::clone(&drops),
            panics: true,
        });
        producer.push(PanicOnDrop {
            drops: Arc::clone(&drops),
            panics: false,
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| consumer.pop()));
        assert!(result.is_err());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        // The failed element left the ring; only the second one remains.
        assert_eq!(consumer.size(), 1);

        drop(producer);
        drop(consumer);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_move_only_type() {
        let (producer, mut consumer) = channel::<Box<u32>>(4).unwrap();
        producer.push(Box::new(1));
        producer.emplace(|| Box::new(2));
        assert_eq!(consumer.try_pop().map(|b| *b), Some(1));
        assert_eq!(consumer.front().map(|b| **b), Some(2));
    }

    #[test]
    fn test_zero_sized_elements() {
        let (producer, mut consumer) = channel::<()>(3).unwrap();
        producer.push(());
        producer.push(());
        assert_eq!(producer.try_push(()), Err(()));
        assert_eq!(consumer.size(), 2);
        consumer.pop();
        assert_eq!(consumer.try_pop(), Some(()));
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_push_blocking_times_out_when_full() {
        let (producer, _consumer) = channel::<u32>(2).unwrap();
        producer.push(1);
        let result = producer.push_blocking(
            2,
            WaitStrategy::Yield,
            Timeout::Duration(Duration::from_millis(5)),
        );
        assert_eq!(result, Err(2));
    }

    #[test]
    fn test_push_blocking_with_unbounded_duration() {
        let (producer, mut consumer) = channel::<u32>(2).unwrap();
        producer.push(1);

        let drain = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            let first = consumer.try_pop();
            (first, consumer)
        });
        let result = producer.push_blocking(
            2,
            WaitStrategy::Yield,
            Timeout::Duration(Duration::MAX),
        );
        assert_eq!(result, Ok(()));

        let (first, mut consumer) = drain.join().unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(
            consumer.pop_blocking(WaitStrategy::Spin, Duration::MAX.into()),
            Some(2)
        );
    }

    #[test]
    fn test_pop_blocking_times_out_when_empty() {
        let (_producer, mut consumer) = channel::<u32>(2).unwrap();
        let popped = consumer.pop_blocking(
            WaitStrategy::Sleep(Duration::from_micros(100)),
            Duration::from_millis(5).into(),
        );
        assert_eq!(popped, None);
    }

    #[test]
    fn test_concurrent_push_pop() {
        let (producer, mut consumer) = channel::<u64>(64).unwrap();
        let count = 100_000u64;

        let producer_handle = std::thread::spawn(move || {
            for i in 0..count {
                producer.push(i);
            }
        });

        let consumer_handle = std::thread::spawn(move || {
            let mut received = Vec::with_capacity(count as usize);
            while received.len() < count as usize {
                if let Some(item) = consumer.pop_blocking(WaitStrategy::Spin, Timeout::Infinite) {
                    received.push(item);
                }
            }
            received
        });

        producer_handle.join().unwrap();
        let received = consumer_handle.join().unwrap();

        // Verify FIFO order
        for (i, &val) in received.iter().enumerate() {
            assert_eq!(val, i as u64);
        }
    }
}
