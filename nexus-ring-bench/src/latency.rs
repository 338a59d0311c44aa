//! Ping-pong round-trip latency.
//!
//! The pinger (producer core) sends a sequence number over the ping ring and
//! spins on the pong ring until the echoer (consumer core) returns it. Only
//! one message is ever in flight.

use std::fmt;
use std::hint::black_box;
use std::time::Instant;

use hdrhistogram::Histogram;
use nexus_ring::{indexed, sentinel};
use tracing::info;

use crate::config::{BenchConfig, QueueKind};
use crate::error::BenchError;
use crate::throughput::{MASK, SLOTS, spawn_pinned};

/// Upper bound of the histogram, in nanoseconds.
const MAX_RTT_NS: u64 = 60_000_000_000;

pub struct LatencyReport {
    pub queue: QueueKind,
    pub histogram: Histogram<u64>,
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.histogram;
        write!(
            f,
            "{:<9} round trip (ns) -> p50={} p99={} p99.9={} max={} ({} samples)",
            self.queue,
            h.value_at_quantile(0.50),
            h.value_at_quantile(0.99),
            h.value_at_quantile(0.999),
            h.max(),
            h.len(),
        )
    }
}

/// Warmup round trips run before recording, a tenth of the samples capped at 10k.
fn warmup(samples: u64) -> u64 {
    (samples / 10).min(10_000)
}

pub fn run(kind: QueueKind, config: &BenchConfig) -> Result<LatencyReport, BenchError> {
    let histogram = Histogram::new_with_bounds(1, MAX_RTT_NS, 3)?;
    let samples = config.latency_samples;
    let warmup = warmup(samples);

    info!(queue = %kind, samples, warmup, "latency test started");
    let histogram = match kind {
        QueueKind::Indexed => indexed_round_trips(config, histogram, warmup, samples)?,
        QueueKind::Sentinel => sentinel_round_trips(config, histogram, warmup, samples)?,
    };

    Ok(LatencyReport {
        queue: kind,
        histogram,
    })
}

fn indexed_round_trips(
    config: &BenchConfig,
    mut histogram: Histogram<u64>,
    warmup: u64,
    samples: u64,
) -> Result<Histogram<u64>, BenchError> {
    let (mut ping_tx, mut ping_rx) = indexed::inline::<u64, SLOTS>()?;
    let (mut pong_tx, mut pong_rx) = indexed::inline::<u64, SLOTS>()?;
    let total = warmup + samples;

    let echo = spawn_pinned("echo", config.consumer_cpu, move || {
        for _ in 0..total {
            pong_tx.push(ping_rx.pop());
        }
    })?;

    let pinger = spawn_pinned("ping", config.producer_cpu, move || {
        for seq in 0..total {
            let start = Instant::now();
            ping_tx.push(seq);
            black_box(pong_rx.pop());
            if seq >= warmup {
                histogram.saturating_record(elapsed_ns(start));
            }
        }
        histogram
    })?;

    let histogram = pinger.join().map_err(|_| BenchError::Panicked("ping"))?;
    echo.join().map_err(|_| BenchError::Panicked("echo"))?;
    Ok(histogram)
}

fn sentinel_round_trips(
    config: &BenchConfig,
    mut histogram: Histogram<u64>,
    warmup: u64,
    samples: u64,
) -> Result<Histogram<u64>, BenchError> {
    let (mut ping_tx, mut ping_rx) = sentinel::queue::<u64, MASK>();
    let (mut pong_tx, mut pong_rx) = sentinel::queue::<u64, MASK>();
    let total = warmup + samples;

    // Runs until the pinger drops its end of the ping ring
    let echo = spawn_pinned("echo", config.consumer_cpu, move || {
        while let Some(seq) = ping_rx.pop() {
            if pong_tx.push(seq).is_err() {
                break;
            }
        }
    })?;

    let pinger = spawn_pinned("ping", config.producer_cpu, move || {
        // Zero is the empty sentinel, so sequence numbers start at 1
        for seq in 1..=total {
            let start = Instant::now();
            if ping_tx.push(seq).is_err() {
                break;
            }
            black_box(pong_rx.pop());
            if seq > warmup {
                histogram.saturating_record(elapsed_ns(start));
            }
        }
        histogram
    })?;

    let histogram = pinger.join().map_err(|_| BenchError::Panicked("ping"))?;
    echo.join().map_err(|_| BenchError::Panicked("echo"))?;
    Ok(histogram)
}

#[inline]
fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
