//! Bounded queue of atomic owning pointer slots.
//!
//! Each slot is an [`AtomicPtr`] that owns at most one boxed element. A push
//! boxes the value and installs the pointer; a pop swaps the slot back to null
//! and takes ownership of whatever it swapped out. Because ownership moves
//! with a single atomic read-modify-write per slot, a pop that loses a race
//! (or a stray extra pop) sees null and reports empty instead of freeing the
//! same element twice.
//!
//! The queue is intended for one producer and one consumer, which the
//! [`SlotProducer`] / [`SlotConsumer`] split enforces. Ordering is only
//! guaranteed per slot, not across slots.
//!
//! # Example
//!
//! ```
//! use boundq::slot;
//!
//! let (producer, mut consumer) = slot::channel::<Vec<u8>>(4)?;
//! producer.try_push(vec![1, 2, 3]).expect("queue full");
//! assert_eq!(consumer.front().map(Vec::len), Some(3));
//! assert_eq!(consumer.pop(), Some(vec![1, 2, 3]));
//! assert!(consumer.is_empty());
//! # Ok::<(), boundq::CapacityError>(())
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::cache::CachePadded;
use crate::error::CapacityError;
use crate::wait::{self, Timeout, WaitStrategy};

/// Smallest accepted capacity.
pub const MIN_CAPACITY: usize = 2;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

struct SlotRing<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    len: CachePadded<AtomicUsize>,
    capacity: usize,
    slots: Box<[AtomicPtr<T>]>,
    _owns: PhantomData<Box<T>>,
}

// SAFETY: elements only ever travel from producer to consumer as owned boxes.
unsafe impl<T: Send> Send for SlotRing<T> {}

// SAFETY: every slot is an AtomicPtr and ownership of the pointee moves with
// the Release store on push / Acquire swap on pop.
unsafe impl<T: Send> Sync for SlotRing<T> {}

impl<T> SlotRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            len: CachePadded::new(AtomicUsize::new(0)),
            capacity,
            slots: (0..capacity)
                .map(|_| AtomicPtr::new(ptr::null_mut()))
                .collect(),
            _owns: PhantomData,
        }
    }

    #[inline]
    fn next(&self, cursor: usize) -> usize {
        (cursor + 1) % self.capacity
    }

    fn try_push(&self, value: T) -> Result<(), T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let next = self.next(tail);
        if next == self.head.load(Ordering::Acquire) {
            return Err(value);
        }

        let owned = Box::into_raw(Box::new(value));
        if self.slots[tail]
            .compare_exchange(ptr::null_mut(), owned, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            // The slot still holds an element nobody has popped yet.
            // SAFETY: `owned` came from Box::into_raw above and was never shared.
            let value = unsafe { Box::from_raw(owned) };
            return Err(*value);
        }

        // Count before publishing so the consumer's decrement never runs first.
        self.len.fetch_add(1, Ordering::Relaxed);
        self.tail.store(next, Ordering::Release);
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }

        let taken = self.slots[head].swap(ptr::null_mut(), Ordering::Acquire);
        if taken.is_null() {
            // A push to this slot is still in flight.
            return None;
        }

        self.head.store(self.next(head), Ordering::Release);
        self.len.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: the swap made this call the sole owner of `taken`, which was
        // produced by Box::into_raw in `try_push`.
        Some(*unsafe { Box::from_raw(taken) })
    }

    /// # Safety
    ///
    /// No pop may run while the returned reference is alive.
    unsafe fn front(&self) -> Option<&T> {
        let head = self.head.load(Ordering::Relaxed);
        if head == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let current = self.slots[head].load(Ordering::Acquire);
        // SAFETY: non-null slots own a live box; the caller keeps pops away.
        unsafe { current.as_ref() }
    }

    fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }
}

impl<T> Drop for SlotRing<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let owned = *slot.get_mut();
            if !owned.is_null() {
                // SAFETY: `&mut self` makes this the last owner of the pointer.
                drop(unsafe { Box::from_raw(owned) });
            }
        }
    }
}

/// Write end of a pointer-slot queue.
///
/// `Send` but not `Sync` or `Clone`: exactly one thread pushes.
pub struct SlotProducer<T> {
    ring: Arc<SlotRing<T>>,
    _unsync: PhantomUnsync,
}

/// Read end of a pointer-slot queue.
///
/// See [`SlotProducer`] for thread safety details.
pub struct SlotConsumer<T> {
    ring: Arc<SlotRing<T>>,
    _unsync: PhantomUnsync,
}

/// Creates a pointer-slot queue with `capacity` slots.
///
/// Like every ring here it keeps one slot free, so it holds `capacity - 1`
/// elements. Elements still queued when both ends are dropped are freed.
///
/// # Errors
///
/// Returns [`CapacityError`] if `capacity < 2`.
pub fn channel<T>(capacity: usize) -> Result<(SlotProducer<T>, SlotConsumer<T>), CapacityError> {
    let capacity = CapacityError::check_min(capacity, MIN_CAPACITY)?;
    let ring = Arc::new(SlotRing::new(capacity));
    Ok((
        SlotProducer {
            ring: Arc::clone(&ring),
            _unsync: PhantomData,
        },
        SlotConsumer {
            ring,
            _unsync: PhantomData,
        },
    ))
}

impl<T> SlotProducer<T> {
    /// Boxes `value` into the next free slot.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full. No allocation survives a
    /// failed push.
    #[inline]
    pub fn try_push(&self, value: T) -> Result<(), T> {
        self.ring.try_push(value)
    }

    /// Waits for a free slot using `wait` between attempts, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` on timeout.
    pub fn push_blocking(&self, value: T, wait: WaitStrategy, timeout: Timeout) -> Result<(), T> {
        wait::retry(value, wait, timeout, |value| self.ring.try_push(value))
    }

    /// Number of stored elements. Approximate while the consumer runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }
}

impl<T> SlotConsumer<T> {
    /// Borrows the element at the head without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        // SAFETY: popping needs `&mut self`, so no pop runs while the
        // reference is alive, and the producer never touches a full slot.
        unsafe { self.ring.front() }
    }

    /// Detaches the element at the head and returns it.
    ///
    /// Returns `None` if the queue is empty or the head slot is still being
    /// filled.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.ring.pop()
    }

    /// Pops and frees the element at the head, reporting whether one existed.
    #[inline]
    pub fn discard(&mut self) -> bool {
        self.ring.pop().is_some()
    }

    /// Waits for an element using `wait` between attempts, up to `timeout`.
    #[must_use]
    pub fn pop_blocking(&mut self, wait: WaitStrategy, timeout: Timeout) -> Option<T> {
        wait::retry((), wait, timeout, |()| self.ring.pop().ok_or(())).ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn rejects_capacity_below_two() {
        assert!(matches!(channel::<u8>(0), Err(CapacityError::Zero)));
        assert!(matches!(
            channel::<u8>(1),
            Err(CapacityError::TooSmall { .. })
        ));
    }

    #[test]
    fn push_then_pop_preserves_order() {
        let (producer, mut consumer) = channel::<u32>(8).unwrap();
        for i in 0..7 {
            producer.try_push(i).unwrap();
        }
        assert_eq!(producer.try_push(99), Err(99));
        assert_eq!(consumer.len(), 7);

        for i in 0..7 {
            assert_eq!(consumer.front(), Some(&i));
            assert_eq!(consumer.pop(), Some(i));
        }
        assert_eq!(consumer.pop(), None);
        assert!(consumer.front().is_none());
        assert!(consumer.is_empty());
    }

    #[test]
    fn stray_pop_on_empty_is_harmless() {
        let (producer, mut consumer) = channel::<String>(4).unwrap();
        producer.try_push("only".to_string()).unwrap();
        assert!(consumer.discard());
        assert!(!consumer.discard());
        assert!(!consumer.discard());
        assert_eq!(consumer.len(), 0);
    }

    #[test]
    fn null_head_slot_reads_as_empty() {
        let (producer, mut consumer) = channel::<u32>(4).unwrap();
        producer.try_push(1).unwrap();
        // Simulate a consumer that already detached the head pointer.
        let stolen = consumer.ring.slots[0].swap(ptr::null_mut(), Ordering::AcqRel);
        assert_eq!(consumer.pop(), None);
        assert_eq!(consumer.ring.head.load(Ordering::Relaxed), 0);
        // SAFETY: the test owns the pointer it swapped out.
        drop(unsafe { Box::from_raw(stolen) });
    }

    #[test]
    fn occupied_slot_rejects_push_without_leaking() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (producer, _consumer) = channel::<DropCounter>(4).unwrap();
        // Park an element in the tail slot without advancing the cursor.
        let parked = Box::into_raw(Box::new(DropCounter(Arc::clone(&drops))));
        producer.ring.slots[0].store(parked, Ordering::Release);

        let rejected = producer.try_push(DropCounter(Arc::clone(&drops)));
        assert!(rejected.is_err());
        drop(rejected);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(producer.len(), 0);
    }

    #[test]
    fn drop_frees_queued_elements() {
        let drops = Arc::new(AtomicUsize::new(0));
        let (producer, mut consumer) = channel::<DropCounter>(6).unwrap();
        for _ in 0..5 {
            producer
                .try_push(DropCounter(Arc::clone(&drops)))
                .unwrap_or_else(|_| panic!("queue full"));
        }
        drop(consumer.pop());
        assert_eq!(drops.load(Ordering::SeqCst), 1);

        drop(producer);
        drop(consumer);
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn push_blocking_times_out() {
        let (producer, _consumer) = channel::<u8>(2).unwrap();
        producer.try_push(1).unwrap();
        let result =
            producer.push_blocking(2, WaitStrategy::Yield, Duration::from_millis(5).into());
        assert_eq!(result, Err(2));
    }

    #[test]
    fn concurrent_transfer_conserves_values() {
        const COUNT: u64 = 100_000;
        let (producer, mut consumer) = channel::<u64>(128).unwrap();

        let handle = std::thread::spawn(move || {
            for i in 1..=COUNT {
                producer
                    .push_blocking(i, WaitStrategy::Spin, Timeout::Infinite)
                    .unwrap();
            }
        });

        let mut sum = 0u64;
        let mut expected = 1;
        while expected <= COUNT {
            if let Some(v) = consumer.pop_blocking(WaitStrategy::Spin, Timeout::Infinite) {
                assert_eq!(v, expected);
                sum += v;
                expected += 1;
            }
        }
        handle.join().unwrap();
        assert_eq!(sum, COUNT * (COUNT + 1) / 2);
    }
}
