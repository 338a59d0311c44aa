//! Sentinel-slot SPSC ring buffer for 8-byte payloads.
//!
//! There are no shared read/write indices. Every slot is an `AtomicU64` on its
//! own cache-line pair, and the value `0` means empty:
//!
//! ```text
//! producer                              consumer
//! ────────                              ────────
//! wait slot[w] == 0                     wait slot[r] != 0   (Acquire)
//! slot[w] = bits        (Release) ───►  v = slot[r]
//! w += 1                           ◄─── slot[r] = 0         (Release)
//!                                       r += 1
//! ```
//!
//! The payload *is* the occupancy flag, so the only cross-core traffic is the
//! slot line being handed over. Positions are thread-local counters; the
//! producer also mirrors its position into a padded atomic that only
//! [`stop`](StopHandle::stop) reads.
//!
//! # Stop protocol
//!
//! A blocking [`pop`](Consumer::pop) cannot tell "momentarily empty" from
//! "producer finished" by looking at a slot. [`stop`](StopHandle::stop)
//! records the producer's write position as a boundary and raises a flag.
//! The consumer keeps draining; it returns `None` only when it finds an empty
//! slot, the flag is raised, *and* its read position has reached the
//! boundary. Everything pushed before the stop is delivered.
//!
//! A blocking [`push`](Producer::push) that is waiting for a free slot gives
//! the value back as [`Stopped`] once the flag is raised.
//!
//! Dropping either handle stops the queue, so the survivor never spins on a
//! peer that is gone.
//!
//! # Example
//!
//! ```
//! use nexus_ring::sentinel;
//! use std::thread;
//!
//! let (mut tx, mut rx) = sentinel::queue::<u64, 0b111>();
//!
//! let consumer = thread::spawn(move || {
//!     let mut sum = 0;
//!     while let Some(v) = rx.pop() {
//!         sum += v;
//!     }
//!     sum
//! });
//!
//! for i in 1..=100 {
//!     tx.push(i).unwrap();
//! }
//! tx.stop();
//!
//! assert_eq!(consumer.join().unwrap(), 5050);
//! ```
//!
//! # Compile-time checks
//!
//! The payload must be 8 bytes, even when it implements [`Payload`]:
//!
//! ```compile_fail
//! use nexus_ring::sentinel::{self, Payload};
//! use std::num::NonZeroU64;
//!
//! struct Half(u32);
//!
//! unsafe impl Payload for Half {
//!     fn into_bits(self) -> u64 {
//!         self.0.into()
//!     }
//!     unsafe fn from_bits(bits: NonZeroU64) -> Self {
//!         Self(bits.get() as u32)
//!     }
//! }
//!
//! let _ = sentinel::queue::<Half, 0b11>();
//! ```
//!
//! `MASK` must be a run of set bits starting at bit 0 (`0b0111`, not `0b0110`):
//!
//! ```compile_fail
//! let _ = nexus_ring::sentinel::queue::<u64, 0b0110>();
//! ```
//!
//! Either handle can move to another thread, but neither can be shared:
//!
//! ```compile_fail
//! fn shared<H: Sync>(_: &H) {}
//! let (tx, _rx) = nexus_ring::sentinel::queue::<u64, 0b11>();
//! shared(&tx);
//! ```
//!
//! ```compile_fail
//! fn shared<H: Sync>(_: &H) {}
//! let (_tx, rx) = nexus_ring::sentinel::queue::<u64, 0b11>();
//! shared(&rx);
//! ```

mod payload;

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::size_of;
use std::num::NonZeroU64;

use crossbeam_utils::CachePadded;

use crate::sync::{self, Arc, AtomicBool, AtomicU64, Ordering};
use crate::trace::{debug, trace};
use crate::{Full, Stopped};

pub use payload::{EMPTY, Payload};

type Slot = CachePadded<AtomicU64>;

/// Creates a sentinel queue with `MASK + 1` slots.
///
/// Shorthand for [`SentinelQueue::new`].
pub fn queue<T: Payload, const MASK: usize>() -> (Producer<T, MASK>, Consumer<T, MASK>) {
    SentinelQueue::new()
}

/// Stop bookkeeping. Written once, read on slow paths only.
struct StopState {
    /// Set by the first `stop()` caller; later callers back off.
    claimed: AtomicBool,
    /// Producer write position at the time of the stop.
    boundary: AtomicU64,
    /// Published after `boundary`.
    raised: AtomicBool,
}

/// Shared ring behind a sentinel [`Producer`]/[`Consumer`] pair.
///
/// `T` is carried only as its bit encoding; the ring never holds a live `T`
/// and never drops one. Thread transfer soundness is part of the
/// [`Payload`] contract.
pub struct SentinelQueue<T, const MASK: usize> {
    slots: Box<[Slot]>,
    /// Mirror of the producer's position, read by `stop()` from any thread.
    write_pos: CachePadded<AtomicU64>,
    stop: CachePadded<StopState>,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Payload, const MASK: usize> SentinelQueue<T, MASK> {
    const VALID: () = {
        assert!(
            size_of::<T>() == 8,
            "sentinel payloads must be exactly 8 bytes"
        );
        assert!(
            MASK & MASK.wrapping_add(1) == 0,
            "MASK must be contiguous set bits from bit 0, e.g. 0b0111"
        );
        assert!(
            MASK < isize::MAX as usize / size_of::<Slot>(),
            "MASK too large"
        );
    };

    /// Number of slots.
    pub const CAPACITY: usize = MASK + 1;

    /// Allocates the ring and returns its two halves.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Producer<T, MASK>, Consumer<T, MASK>) {
        let () = Self::VALID;

        let slots = (0..Self::CAPACITY)
            .map(|_| CachePadded::new(AtomicU64::new(EMPTY)))
            .collect();

        let queue = Arc::new(Self {
            slots,
            write_pos: CachePadded::new(AtomicU64::new(0)),
            stop: CachePadded::new(StopState {
                claimed: AtomicBool::new(false),
                boundary: AtomicU64::new(0),
                raised: AtomicBool::new(false),
            }),
            _marker: PhantomData,
        });

        debug!(capacity = Self::CAPACITY, "sentinel queue created");

        (
            Producer {
                write: 0,
                queue: Arc::clone(&queue),
                _not_sync: PhantomData,
            },
            Consumer {
                read: 0,
                queue,
                _not_sync: PhantomData,
            },
        )
    }
}

impl<T, const MASK: usize> SentinelQueue<T, MASK> {
    fn stop(&self) -> bool {
        if self.stop.claimed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let boundary = self.write_pos.load(Ordering::Acquire);
        self.stop.boundary.store(boundary, Ordering::Relaxed);
        self.stop.raised.store(true, Ordering::Release);

        debug!(boundary, "sentinel queue stopped");
        true
    }

    #[inline]
    fn is_stopped(&self) -> bool {
        self.stop.raised.load(Ordering::Acquire)
    }

    /// True once a stop is raised and `read` has caught up with its boundary.
    #[inline]
    fn is_drained(&self, read: u64) -> bool {
        self.is_stopped() && read >= self.stop.boundary.load(Ordering::Relaxed)
    }
}

impl<T, const MASK: usize> fmt::Debug for SentinelQueue<T, MASK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentinelQueue")
            .field("capacity", &(MASK + 1))
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

#[inline(always)]
#[allow(clippy::cast_possible_truncation)]
fn slot_at<const MASK: usize>(slots: &[Slot], position: u64) -> &AtomicU64 {
    // Safety: slots.len() == MASK + 1 and the masked index is <= MASK
    unsafe { slots.get_unchecked(position as usize & MASK) }
}

#[inline(always)]
fn encode<T: Payload>(value: T) -> u64 {
    let bits = value.into_bits();
    debug_assert_ne!(bits, EMPTY, "pushed a payload equal to the empty sentinel");
    bits
}

/// Requests a stop from any thread.
///
/// Cloneable; every clone refers to the same queue.
pub struct StopHandle<T, const MASK: usize> {
    queue: Arc<SentinelQueue<T, MASK>>,
}

impl<T, const MASK: usize> StopHandle<T, MASK> {
    /// Records the producer's current position as the end of the stream and
    /// raises the stop flag.
    ///
    /// Only the first call on a queue has any effect; it returns `true`.
    /// Later calls return `false`.
    ///
    /// Values the producer pushed before this call are still delivered. When
    /// called from a thread other than the producer, "before" means the push
    /// happens-before the call (for example it was followed by a Release
    /// store this thread Acquire-loaded).
    pub fn stop(&self) -> bool {
        self.queue.stop()
    }

    /// Returns `true` once the queue has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }
}

impl<T, const MASK: usize> Clone for StopHandle<T, MASK> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T, const MASK: usize> fmt::Debug for StopHandle<T, MASK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The producer half of a sentinel queue.
pub struct Producer<T, const MASK: usize> {
    /// Monotonic write position; the slot is `write & MASK`.
    write: u64,
    queue: Arc<SentinelQueue<T, MASK>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Payload, const MASK: usize> Producer<T, MASK> {
    /// Pushes a value, spinning until its slot is empty.
    ///
    /// The value must not encode to [`EMPTY`] (a null pointer or zero);
    /// debug builds panic on it, release builds would lose it and stall the
    /// consumer.
    ///
    /// # Errors
    ///
    /// Returns `Err(Stopped(value))` without writing if the queue is stopped
    /// while this call is waiting for a free slot.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<(), Stopped<T>> {
        if !self.wait_for_slot() {
            return Err(Stopped(value));
        }
        self.publish(encode(value));
        Ok(())
    }

    /// Builds the value with `make` only once its slot is free, then pushes it.
    ///
    /// # Errors
    ///
    /// Returns `Err(Stopped(make))` without calling `make` if the queue is
    /// stopped while waiting.
    #[inline]
    pub fn push_with<F: FnOnce() -> T>(&mut self, make: F) -> Result<(), Stopped<F>> {
        if !self.wait_for_slot() {
            return Err(Stopped(make));
        }
        self.publish(encode(make()));
        Ok(())
    }

    /// Pushes only if the next slot is already empty. Never spins.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the consumer has not yet freed the slot.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), Full<T>> {
        let slot = slot_at::<MASK>(&self.queue.slots, self.write);
        if slot.load(Ordering::Acquire) != EMPTY {
            return Err(Full(value));
        }
        self.publish(encode(value));
        Ok(())
    }

    /// Spins until the current slot is empty. Returns `false` if stopped first.
    #[inline]
    fn wait_for_slot(&self) -> bool {
        let slot = slot_at::<MASK>(&self.queue.slots, self.write);
        while slot.load(Ordering::Acquire) != EMPTY {
            if self.queue.is_stopped() {
                return false;
            }
            sync::spin_loop();
        }
        true
    }
}

impl<T, const MASK: usize> Producer<T, MASK> {
    #[inline(always)]
    fn publish(&mut self, bits: u64) {
        let slot = slot_at::<MASK>(&self.queue.slots, self.write);
        slot.store(bits, Ordering::Release);
        self.write = self.write.wrapping_add(1);
        self.queue.write_pos.store(self.write, Ordering::Relaxed);
    }

    /// Stops the queue at the current write position. See [`StopHandle::stop`].
    pub fn stop(&self) -> bool {
        self.queue.stop()
    }

    /// Returns a handle that can stop the queue from another thread.
    pub fn stop_handle(&self) -> StopHandle<T, MASK> {
        StopHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Returns `true` once the queue has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }

    /// Returns the number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        MASK + 1
    }
}

impl<T, const MASK: usize> Drop for Producer<T, MASK> {
    fn drop(&mut self) {
        if self.queue.stop() {
            trace!(write = self.write, "producer dropped, queue stopped");
        }
    }
}

impl<T, const MASK: usize> fmt::Debug for Producer<T, MASK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("position", &self.write)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// The consumer half of a sentinel queue.
pub struct Consumer<T, const MASK: usize> {
    /// Monotonic read position; the slot is `read & MASK`.
    read: u64,
    queue: Arc<SentinelQueue<T, MASK>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Payload, const MASK: usize> Consumer<T, MASK> {
    /// Pops the next value, spinning until one arrives.
    ///
    /// Returns `None` only at end of stream: the queue is stopped and every
    /// value pushed before the stop has been popped.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let slot = slot_at::<MASK>(&self.queue.slots, self.read);
        loop {
            if let Some(bits) = NonZeroU64::new(slot.load(Ordering::Acquire)) {
                return Some(self.release(bits));
            }
            if self.queue.is_drained(self.read) {
                return None;
            }
            sync::spin_loop();
        }
    }

    /// Pops the next value if its slot is already occupied. Never spins.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let slot = slot_at::<MASK>(&self.queue.slots, self.read);
        NonZeroU64::new(slot.load(Ordering::Acquire)).map(|bits| self.release(bits))
    }

    /// Clears the current slot, handing it back to the producer.
    #[inline(always)]
    fn release(&mut self, bits: NonZeroU64) -> T {
        let slot = slot_at::<MASK>(&self.queue.slots, self.read);
        slot.store(EMPTY, Ordering::Release);
        self.read = self.read.wrapping_add(1);
        // Safety: only `Producer::publish` writes non-empty bits, and it
        // writes `T::into_bits` for the same `T`
        unsafe { T::from_bits(bits) }
    }
}

impl<T, const MASK: usize> Consumer<T, MASK> {
    /// Stops the queue. See [`StopHandle::stop`].
    pub fn stop(&self) -> bool {
        self.queue.stop()
    }

    /// Returns a handle that can stop the queue from another thread.
    pub fn stop_handle(&self) -> StopHandle<T, MASK> {
        StopHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Returns `true` once the queue has been stopped.
    ///
    /// Values may still be waiting; keep popping until `pop` returns `None`.
    pub fn is_stopped(&self) -> bool {
        self.queue.is_stopped()
    }

    /// Returns the number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        MASK + 1
    }
}

impl<T, const MASK: usize> Drop for Consumer<T, MASK> {
    fn drop(&mut self) {
        if self.queue.stop() {
            trace!(read = self.read, "consumer dropped, queue stopped");
        }
    }
}

impl<T, const MASK: usize> fmt::Debug for Consumer<T, MASK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("position", &self.read)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}
