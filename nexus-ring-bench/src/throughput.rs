//! Timed pointer-passing throughput runs.
//!
//! The producer heap-allocates a [`Tagged`] per item and sends ownership
//! through the ring; the consumer checks the tag sequence and frees each
//! allocation. A run lasts [`BenchConfig::duration`] from the moment the
//! start gate opens.

use std::fmt;
use std::hint;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nexus_ring::indexed::{self, Inline};
use nexus_ring::sentinel;
use nexus_ring::{Full, Stopped};
use tracing::{info, warn};

use crate::config::{BenchConfig, QueueKind};
use crate::context::RunContext;
use crate::error::BenchError;
use crate::pin::pin_thread;

/// Ring slots for both variants (`MASK + 1`).
pub const SLOTS: usize = 1024;
pub const MASK: usize = 0b11_1111_1111;

const _: () = assert!(MASK + 1 == SLOTS);

/// Time given to freshly spawned threads to pin and reach the start gate.
const SETTLE: Duration = Duration::from_millis(100);

/// Per-item payload.
#[derive(Debug)]
pub struct Tagged {
    pub index: u64,
}

type IndexedItem = Option<Box<Tagged>>;
type IndexedProducer = indexed::Producer<IndexedItem, Inline<IndexedItem, SLOTS>>;
type IndexedConsumer = indexed::Consumer<IndexedItem, Inline<IndexedItem, SLOTS>>;

/// Consumer-side tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub errors: u64,
}

impl ConsumerStats {
    #[inline]
    fn record(&mut self, index: u64) {
        if index != self.received {
            if self.errors == 0 {
                warn!(got = index, expected = self.received, "queue item out of order");
            }
            self.errors += 1;
        }
        self.received += 1;
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputReport {
    pub queue: QueueKind,
    pub stats: ConsumerStats,
    pub elapsed: Duration,
}

impl ThroughputReport {
    pub fn per_second(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0;
        }
        (self.stats.received as f64 / secs) as u64
    }
}

impl fmt::Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9} transactions -> {}/s ({} items in {:.2?}, {} errors)",
            self.queue,
            self.per_second(),
            self.stats.received,
            self.elapsed,
            self.stats.errors,
        )
    }
}

/// Runs one timed throughput test.
pub fn run(kind: QueueKind, config: &BenchConfig) -> Result<ThroughputReport, BenchError> {
    let ctx = RunContext::new();

    let (producer, consumer) = match kind {
        QueueKind::Indexed => {
            let (tx, rx) = indexed::inline::<IndexedItem, SLOTS>()?;
            spawn_pair(config, &ctx, produce_indexed, consume_indexed, tx, rx)?
        }
        QueueKind::Sentinel => {
            let (tx, rx) = sentinel::queue::<*mut Tagged, MASK>();
            spawn_pair(config, &ctx, produce_sentinel, consume_sentinel, tx, rx)?
        }
    };

    thread::sleep(SETTLE);
    info!(queue = %kind, secs = config.duration.as_secs(), "pointer test started");
    let start = Instant::now();
    ctx.start();

    thread::sleep(config.duration);
    ctx.cancel();

    producer.join().map_err(|_| BenchError::Panicked("producer"))?;
    let stats = consumer.join().map_err(|_| BenchError::Panicked("consumer"))?;
    let elapsed = start.elapsed();
    info!(queue = %kind, received = stats.received, "pointer test ended");

    Ok(ThroughputReport {
        queue: kind,
        stats,
        elapsed,
    })
}

fn spawn_pair<P, C>(
    config: &BenchConfig,
    ctx: &Arc<RunContext>,
    produce: fn(P, &RunContext),
    consume: fn(C, &RunContext) -> ConsumerStats,
    tx: P,
    rx: C,
) -> Result<(JoinHandle<()>, JoinHandle<ConsumerStats>), BenchError>
where
    P: Send + 'static,
    C: Send + 'static,
{
    let consumer = spawn_pinned("consumer", config.consumer_cpu, {
        let ctx = Arc::clone(ctx);
        move || consume(rx, &ctx)
    })?;

    let producer = spawn_pinned("producer", config.producer_cpu, {
        let ctx = Arc::clone(ctx);
        move || produce(tx, &ctx)
    });

    match producer {
        Ok(producer) => Ok((producer, consumer)),
        Err(err) => {
            // Let the consumer drain and exit on its own
            ctx.cancel();
            ctx.finish_producing();
            Err(err)
        }
    }
}

pub(crate) fn spawn_pinned<F, R>(
    name: &'static str,
    cpu: usize,
    body: F,
) -> Result<JoinHandle<R>, BenchError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            pin_thread(cpu);
            body()
        })
        .map_err(|source| BenchError::Spawn { name, source })
}

fn produce_indexed(mut tx: IndexedProducer, ctx: &RunContext) {
    if ctx.wait_for_start() {
        let mut index = 0;
        'run: while !ctx.is_cancelled() {
            let mut item = Some(Box::new(Tagged { index }));
            index += 1;
            while let Err(Full(back)) = tx.try_push(item) {
                if ctx.is_cancelled() {
                    break 'run;
                }
                item = back;
                hint::spin_loop();
            }
        }
    }
    ctx.finish_producing();
}

fn consume_indexed(mut rx: IndexedConsumer, ctx: &RunContext) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    loop {
        if let Some(item) = rx.try_pop() {
            record_indexed(&mut stats, item);
            continue;
        }
        if ctx.is_producing_finished() {
            while let Some(item) = rx.try_pop() {
                record_indexed(&mut stats, item);
            }
            return stats;
        }
        hint::spin_loop();
    }
}

#[inline]
fn record_indexed(stats: &mut ConsumerStats, item: IndexedItem) {
    match item {
        Some(tagged) => stats.record(tagged.index),
        None => stats.errors += 1,
    }
}

fn produce_sentinel(mut tx: sentinel::Producer<*mut Tagged, MASK>, ctx: &RunContext) {
    if ctx.wait_for_start() {
        let mut index = 0;
        while !ctx.is_cancelled() {
            let ptr = Box::into_raw(Box::new(Tagged { index }));
            index += 1;
            if let Err(Stopped(ptr)) = tx.push(ptr) {
                // Safety: the push was refused, so the ring never saw `ptr`
                drop(unsafe { Box::from_raw(ptr) });
                break;
            }
        }
    }
    tx.stop();
}

fn consume_sentinel(
    mut rx: sentinel::Consumer<*mut Tagged, MASK>,
    _ctx: &RunContext,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    while let Some(ptr) = rx.pop() {
        // Safety: every pointer in the ring came from Box::into_raw in the
        // producer and is popped exactly once
        let tagged = unsafe { Box::from_raw(ptr) };
        stats.record(tagged.index);
    }
    stats
}
