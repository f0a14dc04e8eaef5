//! Byte ring buffer algorithm shared by both FIFO variants.
//!
//! The ring is generic over its index cell. [`Cell<u32>`] gives the plain
//! single-threaded variant; [`AtomicU32`] gives the SPSC variant. Layout and
//! algorithm are identical, only the cost of loading and publishing an index
//! differs.
//!
//! # Safety
//!
//! `put` is a producer operation and `get`/`peek` are consumer operations.
//! Callers must guarantee at most one producer and one consumer at a time.

use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::cache::CachePadded;
use crate::error::CapacityError;

/// Largest capacity addressable with `u32` wrapping indices.
pub const MAX_CAPACITY: usize = 1 << 31;

/// Index storage for one side of the ring.
pub(crate) trait FifoIndex {
    fn new(value: u32) -> Self;

    /// Load by the side that owns (writes) this index.
    fn load_own(&self) -> u32;

    /// Load by the opposite side. Pairs with [`FifoIndex::publish`].
    fn load_peer(&self) -> u32;

    /// Publishes a new value after the bytes it covers are in place.
    fn publish(&self, value: u32);
}

impl FifoIndex for Cell<u32> {
    fn new(value: u32) -> Self {
        Cell::new(value)
    }

    #[inline]
    fn load_own(&self) -> u32 {
        self.get()
    }

    #[inline]
    fn load_peer(&self) -> u32 {
        self.get()
    }

    #[inline]
    fn publish(&self, value: u32) {
        self.set(value);
    }
}

impl FifoIndex for AtomicU32 {
    fn new(value: u32) -> Self {
        AtomicU32::new(value)
    }

    #[inline]
    fn load_own(&self) -> u32 {
        // Only this side writes the index.
        self.load(Ordering::Relaxed)
    }

    #[inline]
    fn load_peer(&self) -> u32 {
        self.load(Ordering::Acquire)
    }

    #[inline]
    fn publish(&self, value: u32) {
        self.store(value, Ordering::Release);
    }
}

/// Rounds a requested byte count up to a power of two, minimum 2.
pub(crate) fn round_capacity(requested: usize) -> Result<u32, CapacityError> {
    if requested == 0 {
        return Err(CapacityError::Zero);
    }
    if requested > MAX_CAPACITY {
        return Err(CapacityError::TooLarge {
            requested,
            maximum: MAX_CAPACITY,
        });
    }
    Ok(requested.next_power_of_two().max(2) as u32)
}

/// Power-of-two byte ring with free-running wrapping indices.
pub(crate) struct ByteRing<I> {
    /// Write index, owned by the producer.
    in_index: CachePadded<I>,
    /// Read index, owned by the consumer.
    out_index: CachePadded<I>,
    capacity: u32,
    mask: u32,
    buffer: Box<[UnsafeCell<u8>]>,
}

// SAFETY: the producer only writes bytes in `[in, out + capacity)` and the
// consumer only reads bytes in `[out, in)`. The two ranges are disjoint and
// every index advance is published with Release after the copy and observed
// with Acquire before the peer touches the bytes.
unsafe impl Sync for ByteRing<AtomicU32> {}

impl<I: FifoIndex> ByteRing<I> {
    pub fn with_capacity(requested: usize) -> Result<Self, CapacityError> {
        let capacity = round_capacity(requested)?;
        let buffer = (0..capacity).map(|_| UnsafeCell::new(0)).collect();
        Ok(Self {
            in_index: CachePadded::new(I::new(0)),
            out_index: CachePadded::new(I::new(0)),
            capacity,
            mask: capacity - 1,
            buffer,
        })
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Occupied bytes, as seen by the consumer.
    #[inline]
    pub fn len(&self) -> u32 {
        self.in_index
            .load_peer()
            .wrapping_sub(self.out_index.load_own())
    }

    /// Free bytes, as seen by the producer.
    #[inline]
    pub fn avail(&self) -> u32 {
        self.capacity
            - self
                .in_index
                .load_own()
                .wrapping_sub(self.out_index.load_peer())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_index.load_peer() == self.out_index.load_own()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.avail() == 0
    }

    /// Logically discards all content. Bytes are left in place.
    pub fn reset(&mut self) {
        self.in_index.publish(0);
        self.out_index.publish(0);
    }

    /// Writes as many bytes of `data` as fit and returns that count.
    ///
    /// # Safety
    ///
    /// Caller must be the only producer.
    #[inline]
    pub unsafe fn put(&self, data: &[u8]) -> usize {
        let in_idx = self.in_index.load_own();
        let out_idx = self.out_index.load_peer();
        let free = self.capacity - in_idx.wrapping_sub(out_idx);
        let n = clamp(data.len(), free);
        if n == 0 {
            return 0;
        }

        // SAFETY: `[in_idx, in_idx + n)` is free space owned by the producer;
        // the consumer will not read it until `in_index` is published below.
        unsafe { self.copy_in(in_idx, &data[..n as usize]) };

        self.in_index.publish(in_idx.wrapping_add(n));
        n as usize
    }

    /// Reads up to `out.len()` bytes and consumes them.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn get(&self, out: &mut [u8]) -> usize {
        // SAFETY: forwarded consumer contract.
        let (out_idx, n) = unsafe { self.read(out) };
        if n > 0 {
            self.out_index.publish(out_idx.wrapping_add(n));
        }
        n as usize
    }

    /// Reads up to `out.len()` bytes without consuming them.
    ///
    /// # Safety
    ///
    /// Caller must be the only consumer.
    #[inline]
    pub unsafe fn peek(&self, out: &mut [u8]) -> usize {
        // SAFETY: forwarded consumer contract.
        let (_, n) = unsafe { self.read(out) };
        n as usize
    }

    /// Copies the readable prefix into `out`, returning the read index and
    /// the byte count. Does not publish.
    unsafe fn read(&self, out: &mut [u8]) -> (u32, u32) {
        let out_idx = self.out_index.load_own();
        let in_idx = self.in_index.load_peer();
        let n = clamp(out.len(), in_idx.wrapping_sub(out_idx));
        if n > 0 {
            // SAFETY: `[out_idx, out_idx + n)` was published by the producer
            // (Acquire above) and is not rewritten until `out_index` advances.
            unsafe { self.copy_out(out_idx, &mut out[..n as usize]) };
        }
        (out_idx, n)
    }

    /// Copies `src` into the ring starting at `index`, splitting at the end.
    unsafe fn copy_in(&self, index: u32, src: &[u8]) {
        let offset = (index & self.mask) as usize;
        let first = src.len().min(self.capacity as usize - offset);
        let base = UnsafeCell::raw_get(self.buffer.as_ptr());
        // SAFETY: `offset + first <= capacity` and `src.len() - first <= offset`,
        // so both copies stay inside the buffer; caller owns the range.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), base.add(offset), first);
            ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        }
    }

    /// Copies bytes starting at `index` into `dst`, splitting at the end.
    unsafe fn copy_out(&self, index: u32, dst: &mut [u8]) {
        let offset = (index & self.mask) as usize;
        let first = dst.len().min(self.capacity as usize - offset);
        let base = UnsafeCell::raw_get(self.buffer.as_ptr());
        // SAFETY: same bounds as `copy_in`; caller owns the range.
        unsafe {
            ptr::copy_nonoverlapping(base.add(offset), dst.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }
}

#[inline]
fn clamp(len: usize, limit: u32) -> u32 {
    len.min(limit as usize) as u32
}
