//! Byte-granularity ring buffers.
//!
//! Two variants share one layout and algorithm:
//!
//! - [`ByteFifo`] - plain indices, for single-threaded or externally
//!   synchronized use (for example behind a mutex).
//! - [`AtomicByteFifo`] - atomic indices, lock-free for one producer and one
//!   consumer running concurrently.
//!
//! Capacity is rounded up to a power of two (minimum 2) so that offsets are a
//! mask of the free-running indices. Writes and reads never block: a short
//! `put` or `get` is silently partial and the caller retries with the rest.
//!
//! # Example
//!
//! ```
//! use boundq::fifo::AtomicByteFifo;
//!
//! let mut fifo = AtomicByteFifo::new(1000)?;
//! assert_eq!(fifo.capacity(), 1024);
//!
//! std::thread::scope(|s| {
//!     let (producer, consumer) = fifo.split();
//!     s.spawn(move || {
//!         let mut sent = 0;
//!         while sent < 4 {
//!             sent += producer.put(&42u32.to_le_bytes()[sent..]);
//!         }
//!     });
//!     let mut buf = [0u8; 4];
//!     let mut got = 0;
//!     while got < 4 {
//!         got += consumer.get(&mut buf[got..]);
//!     }
//!     assert_eq!(u32::from_le_bytes(buf), 42);
//! });
//! # Ok::<(), boundq::CapacityError>(())
//! ```

mod ring;

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::AtomicU32;

use crate::error::CapacityError;
use ring::ByteRing;

pub use ring::MAX_CAPACITY;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Single-threaded byte ring buffer.
///
/// Not `Sync`: share it across threads only behind external synchronization.
pub struct ByteFifo {
    ring: ByteRing<Cell<u32>>,
}

impl ByteFifo {
    /// Creates a FIFO holding at least `requested` bytes.
    ///
    /// # Errors
    ///
    /// [`CapacityError::Zero`] for 0, [`CapacityError::TooLarge`] above
    /// [`MAX_CAPACITY`].
    pub fn new(requested: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            ring: ByteRing::with_capacity(requested)?,
        })
    }

    /// Writes as much of `data` as fits; returns the number of bytes written.
    pub fn put(&mut self, data: &[u8]) -> usize {
        // SAFETY: `&mut self` makes this the only producer and consumer.
        unsafe { self.ring.put(data) }
    }

    /// Reads and consumes up to `out.len()` bytes.
    pub fn get(&mut self, out: &mut [u8]) -> usize {
        // SAFETY: `&mut self` makes this the only consumer.
        unsafe { self.ring.get(out) }
    }

    /// Reads up to `out.len()` bytes without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        // SAFETY: `ByteFifo` is not `Sync` and writers need `&mut self`, so no
        // producer or consumer can run while this shared borrow is alive.
        unsafe { self.ring.peek(out) }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Bytes currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len() as usize
    }

    /// Bytes that can be written before the FIFO is full.
    #[must_use]
    pub fn avail(&self) -> usize {
        self.ring.avail() as usize
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }

    /// Discards all content.
    pub fn reset(&mut self) {
        self.ring.reset();
    }
}

/// Lock-free SPSC byte ring buffer.
///
/// Concurrent use goes through [`AtomicByteFifo::split`], which hands out one
/// [`ByteProducer`] and one [`ByteConsumer`]. Both borrow the FIFO, so
/// [`reset`](AtomicByteFifo::reset) can only run once they are gone.
pub struct AtomicByteFifo {
    ring: ByteRing<AtomicU32>,
}

impl AtomicByteFifo {
    /// Creates a FIFO holding at least `requested` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`ByteFifo::new`].
    pub fn new(requested: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            ring: ByteRing::with_capacity(requested)?,
        })
    }

    /// Splits the FIFO into its write and read ends.
    pub fn split(&mut self) -> (ByteProducer<'_>, ByteConsumer<'_>) {
        let ring = &self.ring;
        (
            ByteProducer {
                ring,
                _unsync: PhantomData,
            },
            ByteConsumer {
                ring,
                _unsync: PhantomData,
            },
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len() as usize
    }

    #[must_use]
    pub fn avail(&self) -> usize {
        self.ring.avail() as usize
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }

    /// Discards all content.
    pub fn reset(&mut self) {
        self.ring.reset();
    }
}

/// Write end of an [`AtomicByteFifo`].
///
/// `Send` but not `Sync` or `Clone`: exactly one thread writes.
pub struct ByteProducer<'a> {
    ring: &'a ByteRing<AtomicU32>,
    _unsync: PhantomUnsync,
}

impl ByteProducer<'_> {
    /// Writes as much of `data` as fits; returns the number of bytes written.
    #[inline]
    pub fn put(&self, data: &[u8]) -> usize {
        // SAFETY: only one `ByteProducer` exists per split and it is not `Sync`.
        unsafe { self.ring.put(data) }
    }

    #[must_use]
    pub fn avail(&self) -> usize {
        self.ring.avail() as usize
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }
}

/// Read end of an [`AtomicByteFifo`].
///
/// See [`ByteProducer`] for thread safety details.
pub struct ByteConsumer<'a> {
    ring: &'a ByteRing<AtomicU32>,
    _unsync: PhantomUnsync,
}

impl ByteConsumer<'_> {
    /// Reads and consumes up to `out.len()` bytes.
    #[inline]
    pub fn get(&self, out: &mut [u8]) -> usize {
        // SAFETY: only one `ByteConsumer` exists per split and it is not `Sync`.
        unsafe { self.ring.get(out) }
    }

    /// Reads up to `out.len()` bytes without consuming them.
    #[inline]
    pub fn peek(&self, out: &mut [u8]) -> usize {
        // SAFETY: as for `get`.
        unsafe { self.ring.peek(out) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len() as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.capacity() as usize
    }
}
