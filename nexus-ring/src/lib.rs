//! # nexus-ring
//!
//! Bounded lock-free single-producer single-consumer ring buffers for moving
//! small payloads between two threads pinned to two different cores.
//!
//! ## Variants
//!
//! - [`indexed`]: generic over `T`. Producer and consumer publish separate
//!   read/write indices on their own cache lines and keep a local cached copy
//!   of the other side's index, so the hot path touches no remote line until
//!   the queue looks full or empty.
//! - [`sentinel`]: 8-byte payloads only. There are no shared indices at all;
//!   a slot holding `0` is empty, anything else is a value. The slot content
//!   is the synchronization.
//!
//! ## Design Goals
//!
//! - Busy-spin only, no OS wait primitives on any path
//! - No allocations after construction
//! - Cache-line isolation between producer-owned and consumer-owned state
//! - Single-writer rule enforced by the type system (`&mut self` handles)
//!
//! ## Example
//!
//! ```
//! use nexus_ring::{indexed, sentinel};
//!
//! let (mut tx, mut rx) = indexed::heap::<u64>(1024).unwrap();
//! tx.push(42);
//! assert_eq!(rx.pop(), 42);
//!
//! let (mut tx, mut rx) = sentinel::queue::<u64, 0b1111>();
//! tx.push(7).unwrap();
//! tx.stop();
//! assert_eq!(rx.pop(), Some(7));
//! assert_eq!(rx.pop(), None);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use std::fmt;

use crossbeam_utils::CachePadded;

mod error;
mod sync;
mod trace;

pub mod indexed;
#[cfg(target_pointer_width = "64")]
pub mod sentinel;

pub use error::CapacityError;

/// Destructive-interference size used for all padding in this crate.
///
/// Matches the alignment of [`CachePadded`], which accounts for adjacent-line
/// prefetching (128 bytes on x86_64 and aarch64).
pub const CACHE_LINE: usize = std::mem::align_of::<CachePadded<u8>>();

/// Returned by non-blocking pushes when the queue is full.
///
/// Carries back whatever could not be enqueued.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that couldn't be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

impl<T> std::error::Error for Full<T> {}

/// Returned by a blocking sentinel push that gave up because the queue was
/// stopped while it waited for a free slot.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Stopped<T>(pub T);

impl<T> Stopped<T> {
    /// Returns the value that couldn't be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Stopped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stopped(..)")
    }
}

impl<T> fmt::Display for Stopped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is stopped")
    }
}

impl<T> std::error::Error for Stopped<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_line_is_at_least_64() {
        assert!(CACHE_LINE >= 64);
        assert!(CACHE_LINE.is_power_of_two());
    }

    #[test]
    fn full_hands_value_back() {
        let err = Full(String::from("payload"));
        assert_eq!(err.to_string(), "queue is full");
        assert_eq!(err.into_inner(), "payload");
    }

    #[test]
    fn stopped_hands_value_back() {
        let err = Stopped(9u64);
        assert_eq!(err.to_string(), "queue is stopped");
        assert_eq!(format!("{err:?}"), "Stopped(..)");
        assert_eq!(err.into_inner(), 9);
    }
}
