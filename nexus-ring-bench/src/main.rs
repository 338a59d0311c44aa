//! Two-core benchmark driver for nexus-ring.
//!
//! Usage:
//!     cargo run --release -p nexus-ring-bench
//!
//! Environment variables are documented in [`config`]. `RUST_LOG` controls
//! diagnostics (default `nexus_ring=info,nexus_ring_bench=info`); results go
//! to stdout.

mod config;
mod context;
mod error;
mod latency;
mod pin;
mod throughput;

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::BenchConfig;
use crate::error::BenchError;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nexus_ring=info,nexus_ring_bench=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}

fn main() -> Result<(), BenchError> {
    init_tracing();

    let config = BenchConfig::from_env()?;
    info!(?config, "nexus-ring bench");
    pin::check_placement(config.producer_cpu, config.consumer_cpu);

    println!(
        "nexus-ring SPSC (slots={}, secs={}):",
        throughput::SLOTS,
        config.duration.as_secs()
    );

    for &kind in config.queue.kinds() {
        let report = throughput::run(kind, &config)?;
        if report.stats.errors > 0 {
            warn!(queue = %kind, errors = report.stats.errors, "integrity errors");
        }
        println!("{report}");
    }

    for &kind in config.queue.kinds() {
        println!("{}", latency::run(kind, &config)?);
    }

    Ok(())
}
