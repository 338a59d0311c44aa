use std::io;

use nexus_ring::CapacityError;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),

    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}
