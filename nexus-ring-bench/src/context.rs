//! Per-run coordination shared by the producer, consumer and driver threads.

use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Start gate and cancellation for one benchmark run.
///
/// A fresh context is built for every run and handed to the threads it
/// spawns, so runs never leak state into each other.
#[derive(Debug, Default)]
pub struct RunContext {
    started: AtomicBool,
    cancelled: AtomicBool,
    producer_done: AtomicBool,
}

impl RunContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens the start gate.
    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Spins until the gate opens. Returns `false` if the run was cancelled
    /// before it started.
    pub fn wait_for_start(&self) -> bool {
        while !self.started.load(Ordering::Acquire) {
            if self.is_cancelled() {
                return false;
            }
            hint::spin_loop();
        }
        true
    }

    /// Asks the producer to stop after its current item.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Published by the producer after its final push.
    pub fn finish_producing(&self) {
        self.producer_done.store(true, Ordering::Release);
    }

    /// Once this returns `true`, every item the producer pushed is visible
    /// to the consumer.
    #[inline]
    pub fn is_producing_finished(&self) -> bool {
        self.producer_done.load(Ordering::Acquire)
    }
}
