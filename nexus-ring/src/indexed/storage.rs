//! Backing storage for the indexed queue.
//!
//! Both strategies hold `capacity + 1` live slots. The extra slot keeps
//! `write == read` unambiguous (always empty, never full) and stops a
//! capacity-1 queue from having producer and consumer share a single slot.
//!
//! ```text
//! Heap<T>:
//! ┌──────────────┬──────────────────────────────┬──────────────┐
//! │ front guard  │ live slots [0, capacity]     │ back guard   │
//! │ PADDING × T  │ capacity + 1                 │ PADDING × T  │
//! └──────────────┴──────────────────────────────┴──────────────┘
//!
//! Inline<T, N> (#[repr(C)], embedded in the shared ring):
//! ┌──────────────┬───────────────┬───────┬──────────────┐
//! │ CachePadded  │ [T; N]        │ spare │ CachePadded  │
//! │ <u8> guard   │               │       │ <u8> guard   │
//! └──────────────┴───────────────┴───────┴──────────────┘
//! ```

use std::mem::size_of;

use crossbeam_utils::CachePadded;

use crate::CACHE_LINE;
use crate::error::CapacityError;
use crate::sync::UnsafeCell;

/// Upper bound on the bytes an [`Inline`] buffer may occupy.
///
/// Inline slots are written in place inside the shared heap allocation, so
/// the bound is about allocation size, not the constructing thread's stack.
pub const MAX_INLINE_BYTES: usize = 2 * 1024 * 1024;

mod sealed {
    pub trait Sealed {}
}

/// Slot storage strategy for an indexed queue.
///
/// Implemented by [`Heap`] and [`Inline`]; sealed.
pub trait Storage<T>: sealed::Sealed + Sized {
    /// Short name used in logs and `Debug` output.
    const KIND: &'static str;

    /// Builds storage for `capacity` elements directly at `dst`.
    ///
    /// # Errors
    ///
    /// See [`CapacityError`]: heap storage rejects 0 and overflowing sizes,
    /// inline storage rejects anything other than 0. Nothing is written to
    /// `dst` on error.
    ///
    /// # Safety
    ///
    /// `dst` must be valid for writes and aligned for `Self`. Any previous
    /// value there is overwritten without being dropped.
    unsafe fn init(dst: *mut Self, capacity: usize) -> Result<(), CapacityError>;

    /// Number of live slots (`capacity + 1`).
    fn slots(&self) -> usize;

    /// Runs `f` with a raw pointer to live slot `index`.
    ///
    /// # Safety
    ///
    /// `index < self.slots()`. The caller must hold the side of the index
    /// protocol that currently owns that slot.
    unsafe fn with_slot<R>(&self, index: usize, f: impl FnOnce(*mut T) -> R) -> R;
}

/// Runtime-sized storage in a single boxed slice.
pub struct Heap<T> {
    buffer: Box<[UnsafeCell<T>]>,
    slots: usize,
}

impl<T> Heap<T> {
    /// Guard slots on each side of the live region, at least one cache line.
    pub const PADDING: usize = (CACHE_LINE - 1) / max_one(size_of::<T>()) + 1;
}

impl<T: Default> Heap<T> {
    fn build(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError::Zero);
        }

        let overflow = CapacityError::Overflow {
            requested: capacity,
        };
        let slots = capacity.checked_add(1).ok_or(overflow)?;
        let total = slots.checked_add(2 * Self::PADDING).ok_or(overflow)?;
        // Vec panics past isize::MAX bytes; report it as overflow instead
        let bytes = total.checked_mul(size_of::<T>()).ok_or(overflow)?;
        if bytes > isize::MAX as usize {
            return Err(overflow);
        }

        let buffer = (0..total).map(|_| UnsafeCell::new(T::default())).collect();

        Ok(Self { buffer, slots })
    }
}

const fn max_one(n: usize) -> usize {
    if n == 0 { 1 } else { n }
}

impl<T> sealed::Sealed for Heap<T> {}

impl<T: Default> Storage<T> for Heap<T> {
    const KIND: &'static str = "heap";

    unsafe fn init(dst: *mut Self, capacity: usize) -> Result<(), CapacityError> {
        let heap = Self::build(capacity)?;
        // Safety: caller guarantees dst is writable and aligned
        unsafe { dst.write(heap) };
        Ok(())
    }

    #[inline]
    fn slots(&self) -> usize {
        self.slots
    }

    #[inline(always)]
    unsafe fn with_slot<R>(&self, index: usize, f: impl FnOnce(*mut T) -> R) -> R {
        debug_assert!(index < self.slots);
        unsafe { self.buffer.get_unchecked(index + Self::PADDING) }.with_mut(f)
    }
}

/// Compile-time sized storage embedded directly in the shared ring.
///
/// `N` must be non-zero and `N * size_of::<T>()` must not exceed
/// [`MAX_INLINE_BYTES`]. Both are checked at compile time:
///
/// ```compile_fail
/// use nexus_ring::indexed::{self, Inline};
/// let _ = indexed::channel::<u64, Inline<u64, 0>>(0);
/// ```
///
/// The slots are never assembled on the stack, so a buffer at the size limit
/// can be built from a thread with a small stack.
#[repr(C)]
pub struct Inline<T, const N: usize> {
    _front: CachePadded<u8>,
    slots: [UnsafeCell<T>; N],
    spare: UnsafeCell<T>,
    _back: CachePadded<u8>,
}

impl<T, const N: usize> Inline<T, N> {
    const VALID: () = {
        assert!(N > 0, "inline capacity must be non-zero");
        assert!(
            N <= MAX_INLINE_BYTES / max_one(size_of::<T>()),
            "inline buffer exceeds MAX_INLINE_BYTES"
        );
    };
}

impl<T, const N: usize> sealed::Sealed for Inline<T, N> {}

impl<T: Default, const N: usize> Storage<T> for Inline<T, N> {
    const KIND: &'static str = "inline";

    unsafe fn init(dst: *mut Self, capacity: usize) -> Result<(), CapacityError> {
        let () = Self::VALID;

        if capacity != 0 {
            return Err(CapacityError::RuntimeCapacity(capacity));
        }

        // Safety: caller guarantees dst is writable and aligned; every field
        // is written exactly once, slot by slot, without a stack temporary
        unsafe {
            (&raw mut (*dst)._front).write(CachePadded::new(0));
            let slots = (&raw mut (*dst).slots).cast::<UnsafeCell<T>>();
            for i in 0..N {
                slots.add(i).write(UnsafeCell::new(T::default()));
            }
            (&raw mut (*dst).spare).write(UnsafeCell::new(T::default()));
            (&raw mut (*dst)._back).write(CachePadded::new(0));
        }
        Ok(())
    }

    #[inline]
    fn slots(&self) -> usize {
        N + 1
    }

    #[inline(always)]
    unsafe fn with_slot<R>(&self, index: usize, f: impl FnOnce(*mut T) -> R) -> R {
        debug_assert!(index <= N);
        if index < N {
            unsafe { self.slots.get_unchecked(index) }.with_mut(f)
        } else {
            self.spare.with_mut(f)
        }
    }
}
