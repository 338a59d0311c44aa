//! Synchronization primitives, swapped for loom's under `--cfg loom`.
//!
//! Everything the rings share between threads goes through here so the
//! model checker sees every atomic access, every slot access and every spin.

#[cfg(not(loom))]
pub(crate) use std::sync::Arc;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
#[cfg(loom)]
pub(crate) use loom::sync::Arc;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Busy-wait hint. Under loom it yields so the scheduler can run the peer.
#[cfg(not(loom))]
#[inline(always)]
pub(crate) fn spin_loop() {
    std::hint::spin_loop();
}

#[cfg(loom)]
pub(crate) fn spin_loop() {
    loom::thread::yield_now();
}

/// Moves an already heap-built value into an `Arc` without passing it
/// through the stack.
#[cfg(not(loom))]
pub(crate) fn arc_from_box<T>(boxed: Box<T>) -> Arc<T> {
    Arc::from(boxed)
}

#[cfg(loom)]
pub(crate) fn arc_from_box<T>(boxed: Box<T>) -> Arc<T> {
    Arc::new(*boxed)
}

/// `std::cell::UnsafeCell` with loom's closure-based access API.
#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self(std::cell::UnsafeCell::new(value))
    }

    #[inline(always)]
    pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
        f(self.0.get())
    }
}
