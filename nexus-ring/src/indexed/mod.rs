//! Indexed SPSC ring buffer with cached read/write indices.
//!
//! The producer owns the write index and the consumer owns the read index.
//! Each sits on its own cache line and each side keeps a local snapshot of
//! the other's index. The snapshot is refreshed with a single Acquire load
//! only when the queue *looks* full (producer) or empty (consumer), so in
//! steady state neither side touches the other's line.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ write (CachePadded) - producer stores        │
//! ├──────────────────────────────────────────────┤
//! │ read  (CachePadded) - consumer stores        │
//! ├──────────────────────────────────────────────┤
//! │ storage: Heap<T> | Inline<T, N>              │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Indices live in `[0, capacity]` and wrap by comparison rather than by
//! masking, so any capacity works. One slot is always left unused:
//! `write == read` means empty, `next(write) == read` means full.
//!
//! # Example
//!
//! ```
//! use nexus_ring::indexed;
//!
//! let (mut tx, mut rx) = indexed::heap::<u64>(3).unwrap();
//!
//! tx.push(1);
//! tx.push(2);
//! tx.try_push(3).unwrap();
//! assert!(tx.try_push(4).is_err()); // full at 3
//!
//! assert_eq!(rx.pop(), 1);
//! assert_eq!(rx.try_pop(), Some(2));
//! assert_eq!(rx.len(), 1);
//! ```
//!
//! # Element requirements
//!
//! `T: Default`. Every slot is default-constructed up front and popped
//! values are moved out with [`mem::take`], leaving a default behind. The
//! queue never allocates or frees per element.
//!
//! A panic inside an [`emplace`](Producer::emplace) constructor happens
//! before the slot is written or the index published, so it unwinds to the
//! caller and leaves the queue consistent.
//!
//! # Cancellation
//!
//! There is none. [`Producer::push`] and [`Consumer::pop`] spin until they
//! make progress, even if the other side has been dropped. Callers that need
//! to give up use [`try_push`](Producer::try_push) /
//! [`try_pop`](Consumer::try_pop) in their own loop and check their own flag.

mod storage;

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

use crossbeam_utils::CachePadded;

use crate::Full;
use crate::error::CapacityError;
use crate::sync::{self, Arc, AtomicUsize, Ordering};
use crate::trace::{debug, warn};

pub use storage::{Heap, Inline, MAX_INLINE_BYTES, Storage};

/// Creates an indexed queue over storage strategy `S`.
///
/// `capacity` must be positive for [`Heap`] and 0 for [`Inline`].
///
/// # Errors
///
/// Returns the [`CapacityError`] produced by `S::init`.
///
/// # Example
///
/// ```
/// use nexus_ring::CapacityError;
/// use nexus_ring::indexed::{self, Heap, Inline};
///
/// let (tx, _rx) = indexed::channel::<u64, Inline<u64, 16>>(0).unwrap();
/// assert_eq!(tx.capacity(), 16);
///
/// assert!(matches!(
///     indexed::channel::<u64, Inline<u64, 16>>(16),
///     Err(CapacityError::RuntimeCapacity(16))
/// ));
/// assert!(matches!(
///     indexed::channel::<u64, Heap<u64>>(0),
///     Err(CapacityError::Zero)
/// ));
/// ```
pub fn channel<T, S: Storage<T>>(
    capacity: usize,
) -> Result<(Producer<T, S>, Consumer<T, S>), CapacityError> {
    // Built in place: inline storage can be megabytes
    let mut boxed = Box::<Shared<T, S>>::new_uninit();
    let dst = boxed.as_mut_ptr();

    // Safety: dst points at an exclusively owned, uninitialized Shared
    if let Err(err) = unsafe { S::init(&raw mut (*dst).storage, capacity) } {
        warn!(kind = S::KIND, capacity, %err, "rejected indexed queue capacity");
        return Err(err);
    }
    // Safety: as above; storage is initialized, the indices follow
    let shared = unsafe {
        (&raw mut (*dst).write).write(CachePadded::new(AtomicUsize::new(0)));
        (&raw mut (*dst).read).write(CachePadded::new(AtomicUsize::new(0)));
        (&raw mut (*dst)._marker).write(PhantomData);
        sync::arc_from_box(boxed.assume_init())
    };
    let slots = shared.storage.slots();

    debug!(kind = S::KIND, capacity = slots - 1, "indexed queue created");

    Ok((
        Producer {
            write: 0,
            cached_read: 0,
            slots,
            shared: Arc::clone(&shared),
            _not_sync: PhantomData,
        },
        Consumer {
            read: 0,
            cached_write: 0,
            slots,
            shared,
            _not_sync: PhantomData,
        },
    ))
}

/// Creates a heap-backed queue holding up to `capacity` elements.
///
/// # Errors
///
/// [`CapacityError::Zero`] for 0, [`CapacityError::Overflow`] when the
/// padded buffer would not fit in `usize`.
pub fn heap<T: Default>(capacity: usize) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    channel::<T, Heap<T>>(capacity)
}

/// Creates a queue whose `N` slots are embedded in the shared ring.
///
/// # Errors
///
/// Never fails in practice; the capacity argument is fixed at 0. Invalid `N`
/// is a compile error.
pub fn inline<T: Default, const N: usize>()
-> Result<(Producer<T, Inline<T, N>>, Consumer<T, Inline<T, N>>), CapacityError> {
    channel::<T, Inline<T, N>>(0)
}

#[repr(C)]
struct Shared<T, S> {
    /// Next slot the producer will write. Stored by producer, loaded by consumer.
    write: CachePadded<AtomicUsize>,
    /// Next slot the consumer will read. Stored by consumer, loaded by producer.
    read: CachePadded<AtomicUsize>,
    storage: S,
    _marker: PhantomData<T>,
}

// Safety: slots are only touched by the side that currently owns them under
// the index protocol; ownership moves with the Release/Acquire index pair.
unsafe impl<T: Send, S: Send> Send for Shared<T, S> {}
unsafe impl<T: Send, S: Send> Sync for Shared<T, S> {}

impl<T, S: Storage<T>> Shared<T, S> {
    #[inline]
    fn len(&self, slots: usize) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            slots - read + write
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.write.load(Ordering::Acquire) == self.read.load(Ordering::Acquire)
    }
}

#[inline(always)]
const fn advance(index: usize, slots: usize) -> usize {
    if index + 1 == slots { 0 } else { index + 1 }
}

/// The producer half of an indexed queue.
///
/// Methods that write take `&mut self`, so only one thread can push. The
/// handle can be sent to another thread but not shared between threads:
///
/// ```compile_fail
/// fn shared<H: Sync>(_: &H) {}
/// let (tx, _rx) = nexus_ring::indexed::heap::<u64>(4).unwrap();
/// shared(&tx);
/// ```
pub struct Producer<T, S: Storage<T> = Heap<T>> {
    /// Authoritative write index, mirrored to `shared.write` after each push.
    write: usize,
    /// Last observed consumer index. Refreshed only when the queue looks full.
    cached_read: usize,
    slots: usize,
    shared: Arc<Shared<T, S>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T, S: Storage<T>> Producer<T, S> {
    /// Pushes a value, spinning until a slot is free.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::indexed;
    /// use std::thread;
    ///
    /// let (mut tx, mut rx) = indexed::heap::<u32>(1).unwrap();
    ///
    /// let consumer = thread::spawn(move || (0..100).map(|_| rx.pop()).sum::<u32>());
    /// for i in 0..100 {
    ///     tx.push(i);
    /// }
    /// assert_eq!(consumer.join().unwrap(), (0..100u32).sum::<u32>());
    /// ```
    #[inline]
    pub fn push(&mut self, value: T) {
        let next = advance(self.write, self.slots);
        if next == self.cached_read {
            self.wait_for_slot(next);
        }
        // Safety: next != read, so slot `write` belongs to the producer
        unsafe { self.publish(next, value) };
    }

    /// Constructs a value with `make` once a slot is free, then pushes it.
    ///
    /// `make` runs after the wait, so expensive construction never delays
    /// a queue that is already full.
    #[inline]
    pub fn emplace<F: FnOnce() -> T>(&mut self, make: F) {
        let next = advance(self.write, self.slots);
        if next == self.cached_read {
            self.wait_for_slot(next);
        }
        let value = make();
        // Safety: as in push
        unsafe { self.publish(next, value) };
    }

    /// Attempts to push without spinning.
    ///
    /// On a queue that looks full the cached read index is refreshed once.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the queue is still full after the refresh.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), Full<T>> {
        let next = advance(self.write, self.slots);
        if next == self.cached_read && !self.refresh(next) {
            return Err(Full(value));
        }
        // Safety: as in push
        unsafe { self.publish(next, value) };
        Ok(())
    }

    /// Attempts to construct and push without spinning.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(make))` without calling `make` if the queue is full.
    #[inline]
    pub fn try_emplace<F: FnOnce() -> T>(&mut self, make: F) -> Result<(), Full<F>> {
        let next = advance(self.write, self.slots);
        if next == self.cached_read && !self.refresh(next) {
            return Err(Full(make));
        }
        let value = make();
        // Safety: as in push
        unsafe { self.publish(next, value) };
        Ok(())
    }

    /// Pushes without checking for space.
    ///
    /// # Safety
    ///
    /// The queue must not be full. The caller tracks occupancy itself (for
    /// example by counting acknowledgements from the consumer). Pushing into a
    /// full queue overwrites a slot the consumer may be reading, which is a
    /// data race, and makes the queue appear empty.
    #[inline]
    pub unsafe fn force_push(&mut self, value: T) {
        let next = advance(self.write, self.slots);
        unsafe { self.publish(next, value) };
    }

    /// [`force_push`](Self::force_push) with in-place construction.
    ///
    /// # Safety
    ///
    /// Same contract as [`force_push`](Self::force_push).
    #[inline]
    pub unsafe fn force_emplace<F: FnOnce() -> T>(&mut self, make: F) {
        let next = advance(self.write, self.slots);
        let value = make();
        unsafe { self.publish(next, value) };
    }

    /// Reloads the consumer index. Returns `true` if `next` is now free.
    #[inline]
    fn refresh(&mut self, next: usize) -> bool {
        self.cached_read = self.shared.read.load(Ordering::Acquire);
        next != self.cached_read
    }

    #[cold]
    fn wait_for_slot(&mut self, next: usize) {
        while !self.refresh(next) {
            sync::spin_loop();
        }
    }

    /// Writes the current slot and release-publishes `next`.
    ///
    /// # Safety
    ///
    /// Slot `self.write` must be owned by the producer.
    #[inline(always)]
    unsafe fn publish(&mut self, next: usize, value: T) {
        unsafe {
            self.shared
                .storage
                .with_slot(self.write, |slot| *slot = value);
        }
        self.shared.write.store(next, Ordering::Release);
        self.write = next;
    }

    /// Returns the number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots - 1
    }

    /// Returns the number of queued elements.
    ///
    /// Advisory: the two index loads are not taken atomically together.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len(self.slots)
    }

    /// Returns `true` if the queue is empty (advisory snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Returns `true` if the consumer has been dropped.
    ///
    /// Blocking pushes do not check this.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }
}

impl<T, S: Storage<T>> fmt::Debug for Producer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("storage", &S::KIND)
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// The consumer half of an indexed queue.
///
/// Methods that read take `&mut self`, so only one thread can pop. Like the
/// producer it is `Send` but not `Sync`:
///
/// ```compile_fail
/// fn shared<H: Sync>(_: &H) {}
/// let (_tx, rx) = nexus_ring::indexed::heap::<u64>(4).unwrap();
/// shared(&rx);
/// ```
pub struct Consumer<T, S: Storage<T> = Heap<T>> {
    /// Authoritative read index, mirrored to `shared.read` after each pop.
    read: usize,
    /// Last observed producer index. Refreshed only when the queue looks empty.
    cached_write: usize,
    /// Live slot count, cached so the wrap check never leaves this struct.
    slots: usize,
    shared: Arc<Shared<T, S>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<T: Default, S: Storage<T>> Consumer<T, S> {
    /// Pops the oldest value, spinning until one is available.
    #[inline]
    pub fn pop(&mut self) -> T {
        if self.read == self.cached_write {
            self.wait_for_value();
        }
        // Safety: read != write, so slot `read` holds a published value
        unsafe { self.take() }
    }

    /// Pops the oldest value if one is available.
    ///
    /// On a queue that looks empty the cached write index is refreshed once.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        if self.read == self.cached_write && !self.refresh() {
            return None;
        }
        // Safety: as in pop
        Some(unsafe { self.take() })
    }

    /// Moves the current slot out and release-publishes the next index.
    ///
    /// # Safety
    ///
    /// Slot `self.read` must hold a value published by the producer.
    #[inline(always)]
    unsafe fn take(&mut self) -> T {
        let value = unsafe {
            self.shared
                .storage
                .with_slot(self.read, |slot| mem::take(&mut *slot))
        };
        let next = advance(self.read, self.slots);
        self.shared.read.store(next, Ordering::Release);
        self.read = next;
        value
    }
}

impl<T, S: Storage<T>> Consumer<T, S> {
    /// Reloads the producer index. Returns `true` if a value is now visible.
    #[inline]
    fn refresh(&mut self) -> bool {
        self.cached_write = self.shared.write.load(Ordering::Acquire);
        self.read != self.cached_write
    }

    #[cold]
    fn wait_for_value(&mut self) {
        while !self.refresh() {
            sync::spin_loop();
        }
    }

    /// Returns the number of elements the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots - 1
    }

    /// Returns the number of queued elements.
    ///
    /// Advisory: the two index loads are not taken atomically together.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len(self.slots)
    }

    /// Returns `true` if the queue is empty (advisory snapshot).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.is_empty()
    }

    /// Returns `true` if the producer has been dropped.
    ///
    /// Values already pushed can still be popped. Blocking pops do not check
    /// this.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.shared) == 1
    }
}

impl<T, S: Storage<T>> fmt::Debug for Consumer<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("storage", &S::KIND)
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn basic_push_pop() {
        let (mut tx, mut rx) = heap::<u64>(8).unwrap();

        tx.push(1);
        tx.push(2);
        tx.push(3);

        assert_eq!(rx.pop(), 1);
        assert_eq!(rx.pop(), 2);
        assert_eq!(rx.pop(), 3);
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn capacity_is_exact() {
        let (tx, rx) = heap::<u64>(100).unwrap();
        assert_eq!(tx.capacity(), 100);
        assert_eq!(rx.capacity(), 100);

        let (tx, _rx) = inline::<u64, 7>().unwrap();
        assert_eq!(tx.capacity(), 7);
    }

    #[test]
    fn queue_full() {
        let (mut tx, mut rx) = heap::<u64>(4).unwrap();

        for i in 1..=4 {
            tx.try_push(i).unwrap();
        }
        assert_eq!(tx.len(), 4);

        assert!(matches!(tx.try_push(5), Err(Full(5))));

        assert_eq!(rx.pop(), 1);
        tx.try_push(5).unwrap();
        assert!(tx.try_push(6).is_err());
    }

    #[test]
    fn interleaved_after_two_queued() {
        let (mut tx, mut rx) = heap::<u64>(4).unwrap();
        let mut popped = Vec::new();

        tx.push(0);
        tx.push(1);
        for v in 2..8 {
            tx.push(v);
            assert!(tx.len() <= 4);
            popped.push(rx.pop());
            assert!(rx.len() <= 4);
        }
        while let Some(v) = rx.try_pop() {
            popped.push(v);
        }

        assert_eq!(popped, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn len_wraps() {
        let (mut tx, mut rx) = heap::<u64>(3).unwrap();

        // Move both indices near the end of the ring
        for i in 0..3 {
            tx.push(i);
            rx.pop();
        }
        assert_eq!(tx.len(), 0);
        assert!(rx.is_empty());

        // write wraps past the end, read has not
        tx.push(10);
        tx.push(11);
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        assert!(!tx.is_empty());
    }

    #[test]
    fn capacity_one() {
        let (mut tx, mut rx) = heap::<u64>(1).unwrap();

        for i in 0..1000 {
            tx.try_push(i).unwrap();
            assert!(tx.try_push(i).is_err());
            assert_eq!(rx.try_pop(), Some(i));
            assert_eq!(rx.try_pop(), None);
        }
    }

    #[test]
    fn wrapping_indices() {
        let (mut tx, mut rx) = inline::<u64, 4>().unwrap();

        for lap in 0..100u64 {
            for i in 0..4 {
                tx.push(lap * 4 + i);
            }
            for i in 0..4 {
                assert_eq!(rx.pop(), lap * 4 + i);
            }
        }
    }

    #[test]
    fn emplace_runs_after_space() {
        let (mut tx, mut rx) = heap::<String>(2).unwrap();

        tx.emplace(|| "a".to_string());
        tx.try_emplace(|| "b".to_string()).unwrap();

        let mut called = false;
        let rejected = tx.try_emplace(|| {
            called = true;
            "c".to_string()
        });
        assert!(rejected.is_err());
        drop(rejected);
        assert!(!called);

        assert_eq!(rx.pop(), "a");
        assert_eq!(rx.pop(), "b");
    }

    #[test]
    fn force_push_within_capacity() {
        let (mut tx, mut rx) = heap::<u64>(4).unwrap();

        // Caller-side accounting: never more than 4 outstanding
        for i in 0..4 {
            unsafe { tx.force_push(i) };
        }
        assert_eq!(rx.pop(), 0);
        unsafe { tx.force_emplace(|| 99) };
        assert_eq!(rx.len(), 4);

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_pop()).collect();
        assert_eq!(drained, [1, 2, 3, 99]);
    }

    #[test]
    fn moves_values_out() {
        let (mut tx, mut rx) = heap::<Vec<u8>>(2).unwrap();

        tx.push(vec![1, 2, 3]);
        let v = rx.pop();
        assert_eq!(v, [1, 2, 3]);
    }

    #[test]
    fn emplace_panic_leaves_queue_usable() {
        let (mut tx, mut rx) = heap::<u64>(2).unwrap();
        tx.push(1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tx.emplace(|| panic!("constructor failed"));
        }));
        assert!(result.is_err());

        tx.push(2);
        assert_eq!(rx.pop(), 1);
        assert_eq!(rx.pop(), 2);
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn disconnect_is_observable() {
        let (tx, rx) = heap::<u64>(4).unwrap();
        assert!(!tx.is_disconnected());
        drop(rx);
        assert!(tx.is_disconnected());
    }

    #[test]
    fn drops_every_slot_once() {
        static LIVE: AtomicUsize = AtomicUsize::new(0);

        struct Counted;
        impl Default for Counted {
            fn default() -> Self {
                LIVE.fetch_add(1, Ordering::SeqCst);
                Self
            }
        }
        impl Drop for Counted {
            fn drop(&mut self) {
                LIVE.fetch_sub(1, Ordering::SeqCst);
            }
        }

        {
            let (mut tx, mut rx) = heap::<Counted>(4).unwrap();
            tx.push(Counted::default());
            tx.push(Counted::default());
            let _ = rx.pop();
        }
        assert_eq!(LIVE.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cross_thread() {
        const COUNT: u64 = 100_000;
        let (mut tx, mut rx) = heap::<u64>(64).unwrap();

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                tx.push(i);
            }
        });

        for expected in 0..COUNT {
            assert_eq!(rx.pop(), expected);
        }

        producer.join().unwrap();
    }

    #[test]
    fn handles_move_between_threads() {
        fn assert_send<H: Send>(_: &H) {}

        let (tx, rx) = heap::<String>(4).unwrap();
        assert_send(&tx);
        assert_send(&rx);
        let (tx, rx) = inline::<Vec<u8>, 4>().unwrap();
        assert_send(&tx);
        assert_send(&rx);
    }

    #[test]
    fn inline_at_size_limit_on_a_small_stack() {
        const N: usize = MAX_INLINE_BYTES / 8;

        let popped = thread::Builder::new()
            .stack_size(128 * 1024)
            .spawn(|| {
                let (mut tx, mut rx) = inline::<u64, N>().unwrap();
                assert_eq!(tx.capacity(), N);
                for i in 0..N as u64 {
                    tx.push(i);
                }
                assert!(tx.try_push(0).is_err());
                (rx.pop(), rx.len())
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(popped, (0, N - 1));
    }

    #[test]
    fn debug_output() {
        let (tx, _rx) = inline::<u8, 2>().unwrap();
        let s = format!("{tx:?}");
        assert!(s.contains("inline"));
        assert!(s.contains("capacity: 2"));
    }
}
