//! Lock-free SPSC slot ring.
//!
//! A fixed array of in-place element slots driven by two cursors in
//! `[0, capacity)`. One slot always stays empty so that `head == tail` means
//! empty and `head + 1 == tail` (mod capacity) means full.
//!
//! # Safety
//!
//! The types in this module have unsafe APIs because they require the caller to
//! uphold the SPSC invariant: exactly one producer and one consumer, with no
//! concurrent access to either role.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::slot_padding;

/// Role marker: Fields with this role are owned exclusively by the producer.
pub struct ProducerRole;

/// Role marker: Fields with this role are owned exclusively by the consumer.
pub struct ConsumerRole;

/// Role marker: Buffer slots whose ownership transfers via the SPSC protocol.
pub struct SlotRole;

/// Interior-mutable cell with a role marker for nominal type safety.
///
/// The `Role` doesn't affect runtime behavior. It makes the producer cache,
/// the consumer cache and the slots distinct types so one can't be passed
/// where another is expected.
#[repr(transparent)]
pub struct SpscCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T, Role> SpscCell<T, Role> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    pub const fn get(&self) -> *mut T {
        self.0.get()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.0.get_mut()
    }
}

/// Cache cell owned exclusively by the producer.
pub type ProducerCache<T> = SpscCell<T, ProducerRole>;

/// Cache cell owned exclusively by the consumer.
pub type ConsumerCache<T> = SpscCell<T, ConsumerRole>;

/// Buffer slot cell with ownership governed by the SPSC protocol.
pub type SlotCell<T> = SpscCell<MaybeUninit<T>, SlotRole>;

/// Producer-side state: head cursor and cached tail.
#[repr(C)]
#[repr(align(128))]
pub struct ProducerState {
    /// Next slot to write. Owned by producer, read by consumer.
    pub head: AtomicUsize,

    /// Last tail value the producer observed.
    pub cached_tail: ProducerCache<usize>,
}

/// Consumer-side state: tail cursor and cached head.
#[repr(C)]
#[repr(align(128))]
pub struct ConsumerState {
    /// Next slot to read. Owned by consumer, read by producer.
    pub tail: AtomicUsize,

    /// Last head value the consumer observed.
    pub cached_head: ConsumerCache<usize>,
}

/// Slot ring with runtime capacity.
///
/// Field order keeps the read-only fields, the producer line and the consumer
/// line apart; `ConsumerState` is the last field and its alignment pads the
/// struct to a full line.
#[repr(C)]
pub struct Ring<T> {
    capacity: usize,
    /// Padding slots before and after the live range.
    lead: usize,
    slots: Box<[SlotCell<T>]>,

    producer: ProducerState,
    consumer: ConsumerState,
}

// SAFETY: Ring is Send because it owns its `T`s and every field is Send.
unsafe impl<T: Send> Send for Ring<T> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - head/tail are AtomicUsize with Release/Acquire ordering
// - cached cursors are only touched by their owning side
// - a slot is written only by the producer before head is published and read
//   only by the consumer before tail is published
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Creates an empty ring. Caller has validated `capacity >= 2`.
    pub fn new(capacity: usize) -> Self {
        let lead = slot_padding::<T>();
        let slots = (0..capacity + 2 * lead)
            .map(|_| SlotCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            capacity,
            lead,
            slots,
            producer: ProducerState {
                head: AtomicUsize::new(0),
                cached_tail: ProducerCache::new(0),
            },
            consumer: ConsumerState {
                tail: AtomicUsize::new(0),
                cached_head: ConsumerCache::new(0),
            },
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advances a cursor, wrapping to 0 at capacity.
    ///
    /// Equivalent to `(cursor + 1) % capacity` without the division.
    #[inline]
    fn bump(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.capacity { 0 } else { next }
    }

    #[inline]
    fn slot(&self, cursor: usize) -> *mut MaybeUninit<T> {
        self.slots[cursor + self.lead].get()
    }

    /// Number of stored elements. Approximate under concurrent mutation.
    #[inline]
    pub fn size(&self) -> usize {
        let head = self.producer.head.load(Ordering::Acquire);
        let tail = self.consumer.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            head + self.capacity - tail
        }
    }

    /// Reserves the slot at `head` if the ring is not full.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn claim(&self) -> Option<usize> {
        let head = self.producer.head.load(Ordering::Relaxed);
        let next = self.bump(head);

        // SAFETY: Producer has exclusive access to cached_tail.
        let cached_tail = unsafe { &mut *self.producer.cached_tail.get() };
        if next == *cached_tail {
            // Refresh cache from actual tail (acquire to sync with consumer)
            *cached_tail = self.consumer.tail.load(Ordering::Acquire);
            if next == *cached_tail {
                return None;
            }
        }
        Some(head)
    }

    /// Writes `value` into a claimed slot and publishes it.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer and `head` must come from the
    /// immediately preceding successful [`Ring::claim`].
    #[inline]
    pub unsafe fn publish(&self, head: usize, value: T) {
        // SAFETY: The producer owns the slot at `head`: the claim saw space,
        // and the consumer won't read it until the new head is published.
        unsafe { ptr::write(self.slot(head), MaybeUninit::new(value)) };
        self.producer.head.store(self.bump(head), Ordering::Release);
    }

    /// Returns the cursor of the oldest element, or `None` if empty.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    unsafe fn ready(&self) -> Option<usize> {
        let tail = self.consumer.tail.load(Ordering::Relaxed);

        // SAFETY: Consumer has exclusive access to cached_head.
        let cached_head = unsafe { &mut *self.consumer.cached_head.get() };
        if *cached_head == tail {
            // Refresh cache from actual head (acquire to sync with producer)
            *cached_head = self.producer.head.load(Ordering::Acquire);
            if *cached_head == tail {
                return None;
            }
        }
        Some(tail)
    }

    /// Borrows the oldest element.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer and must not release the slot while
    /// the reference is alive.
    #[inline]
    pub unsafe fn front(&self) -> Option<&T> {
        // SAFETY: forwarded consumer contract.
        let tail = unsafe { self.ready()? };
        // SAFETY: The slot at `tail` was initialized and published by the
        // producer, and stays untouched until the consumer advances tail.
        Some(unsafe { (*self.slot(tail)).assume_init_ref() })
    }

    /// Moves the oldest element out.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn pop(&self) -> Option<T> {
        // SAFETY: forwarded consumer contract.
        let tail = unsafe { self.ready()? };
        // SAFETY: initialized slot owned by the consumer until tail advances.
        let item = unsafe { ptr::read(self.slot(tail)).assume_init() };
        self.consumer.tail.store(self.bump(tail), Ordering::Release);
        Some(item)
    }

    /// Drops the oldest element in place.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn discard(&self) -> bool {
        // Move out and release the slot first: if the destructor panics the
        // element is already gone from the ring and is never dropped again.
        // SAFETY: forwarded consumer contract.
        let popped = unsafe { self.pop() };
        popped.is_some()
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let head = *self.producer.head.get_mut();
        let mut tail = *self.consumer.tail.get_mut();
        while tail != head {
            let slot = self.slots[tail + self.lead].get_mut();
            // SAFETY: every slot in `[tail, head)` holds a live element and
            // `&mut self` rules out concurrent access.
            unsafe { slot.assume_init_drop() };
            tail = self.bump(tail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CACHE_LINE_SIZE;
    use std::mem::offset_of;

    #[test]
    fn cursors_live_on_separate_lines() {
        let head = offset_of!(Ring<u64>, producer);
        let tail = offset_of!(Ring<u64>, consumer);
        assert!(tail - head >= CACHE_LINE_SIZE);
        assert_eq!(head % CACHE_LINE_SIZE, 0);
        assert_eq!(std::mem::size_of::<Ring<u64>>() % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn slot_array_is_padded_on_both_ends() {
        let ring = Ring::<u64>::new(4);
        assert_eq!(ring.lead, CACHE_LINE_SIZE / 8);
        assert_eq!(ring.slots.len(), 4 + 2 * ring.lead);
    }

    #[test]
    fn size_corrects_for_wraparound() {
        let ring = Ring::<u32>::new(4);
        // SAFETY: single-threaded test.
        unsafe {
            for i in 0..3 {
                let head = ring.claim().unwrap();
                ring.publish(head, i);
            }
            assert_eq!(ring.pop(), Some(0));
            assert_eq!(ring.pop(), Some(1));
            let head = ring.claim().unwrap();
            ring.publish(head, 3);
        }
        // head wrapped to 0, tail is 2
        assert_eq!(ring.size(), 2);
    }
}
