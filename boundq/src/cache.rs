//! Cache-line isolation helpers.
//!
//! Producer and consumer cursors live on separate cache lines so that an
//! update on one side never invalidates the line the other side is spinning
//! on. Slot arrays additionally carry lead and trail padding so that
//! neighbouring heap allocations cannot share a line with the first or last
//! slot.

use std::mem::{align_of, size_of};
use std::ops::Deref;

/// Target cache line size in bytes.
///
/// 128 covers adjacent-line prefetching on x86 and the 128-byte lines on
/// Apple silicon. This is a tunable: changing it requires updating the
/// `repr(align)` on [`CachePadded`] as well, which the compile-time check
/// below enforces.
pub const CACHE_LINE_SIZE: usize = 128;

/// Aligns and pads a value to occupy a full cache line.
#[derive(Debug, Default)]
#[repr(C)]
#[repr(align(128))]
pub struct CachePadded<T> {
    value: T,
}

const _: () = assert!(align_of::<CachePadded<u8>>() == CACHE_LINE_SIZE);

impl<T> CachePadded<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

/// Number of `T` cells needed to cover one cache line.
///
/// Used as lead and trail padding around slot arrays. Zero-sized types never
/// touch memory, so they need no padding.
#[must_use]
pub const fn slot_padding<T>() -> usize {
    let size = size_of::<T>();
    if size == 0 {
        0
    } else {
        (CACHE_LINE_SIZE - 1) / size + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn padded_atomic_fills_a_line() {
        assert_eq!(size_of::<CachePadded<AtomicUsize>>(), CACHE_LINE_SIZE);
        assert_eq!(align_of::<CachePadded<AtomicUsize>>(), CACHE_LINE_SIZE);
    }

    #[test]
    fn adjacent_padded_fields_do_not_share_a_line() {
        struct Pair {
            a: CachePadded<AtomicUsize>,
            b: CachePadded<AtomicUsize>,
        }
        let pair = Pair {
            a: CachePadded::new(AtomicUsize::new(0)),
            b: CachePadded::new(AtomicUsize::new(0)),
        };
        let a = std::ptr::from_ref(&*pair.a) as usize;
        let b = std::ptr::from_ref(&*pair.b) as usize;
        assert!(a.abs_diff(b) >= CACHE_LINE_SIZE);
    }

    #[test]
    fn slot_padding_covers_a_line() {
        assert_eq!(slot_padding::<u8>(), CACHE_LINE_SIZE);
        assert_eq!(slot_padding::<u64>(), CACHE_LINE_SIZE / 8);
        assert_eq!(slot_padding::<[u8; 100]>(), 2);
        assert_eq!(slot_padding::<[u8; 256]>(), 1);
        assert_eq!(slot_padding::<()>(), 0);
    }
}
