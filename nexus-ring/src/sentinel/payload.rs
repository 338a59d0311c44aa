//! Payload encoding for sentinel slots.

use std::num::{NonZeroU64, NonZeroUsize};
use std::ptr::{self, NonNull};

/// Bit pattern of an empty slot.
pub const EMPTY: u64 = 0;

/// An 8-byte value that can travel through a [`SentinelQueue`](super::SentinelQueue).
///
/// The queue stores `into_bits()` in an `AtomicU64` and treats [`EMPTY`] (0)
/// as "no value". Types with a niche at zero (`NonNull`, `NonZeroU64`) can
/// never collide with it. For everything else, never pushing a zero-valued
/// payload is the caller's job; debug builds assert on it.
///
/// The queue never dereferences, frees or drops what a pointer payload refers
/// to. Pointee lifetime belongs to the application.
///
/// # Safety
///
/// - `Self` is exactly 8 bytes.
/// - `from_bits(into_bits(v))` reconstructs `v`.
/// - Moving a value to another thread through the queue is sound. Raw
///   pointers qualify because using them already requires `unsafe`.
pub unsafe trait Payload: Sized {
    /// Encodes the value. Must not return [`EMPTY`] for a value that will be
    /// pushed.
    fn into_bits(self) -> u64;

    /// Decodes a value previously produced by [`into_bits`](Self::into_bits).
    ///
    /// # Safety
    ///
    /// `bits` must come from `into_bits` on the same type.
    unsafe fn from_bits(bits: NonZeroU64) -> Self;
}

unsafe impl<U> Payload for *mut U {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.expose_provenance() as u64
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        ptr::with_exposed_provenance_mut(bits.get() as usize)
    }
}

unsafe impl<U> Payload for *const U {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.expose_provenance() as u64
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        ptr::with_exposed_provenance(bits.get() as usize)
    }
}

unsafe impl<U> Payload for NonNull<U> {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.as_ptr().into_bits()
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        unsafe { Self::new_unchecked(<*mut U>::from_bits(bits)) }
    }
}

unsafe impl Payload for u64 {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        bits.get()
    }
}

unsafe impl Payload for i64 {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.cast_unsigned()
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        bits.get().cast_signed()
    }
}

unsafe impl Payload for usize {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self as u64
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        bits.get() as Self
    }
}

unsafe impl Payload for NonZeroU64 {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.get()
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        bits
    }
}

unsafe impl Payload for NonZeroUsize {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        self.get() as u64
    }

    #[inline(always)]
    unsafe fn from_bits(bits: NonZeroU64) -> Self {
        unsafe { Self::new_unchecked(bits.get() as usize) }
    }
}
