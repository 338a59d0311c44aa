//! Environment-driven run configuration.
//!
//! | Variable                | Default | Meaning                              |
//! |-------------------------|---------|--------------------------------------|
//! | `PRODUCER_CPU`          | 3       | core the producer thread pins to     |
//! | `CONSUMER_CPU`          | 1       | core the consumer thread pins to     |
//! | `BENCH_SECS`            | 5       | length of each throughput run        |
//! | `BENCH_QUEUE`           | `all`   | `all`, `indexed` or `sentinel`       |
//! | `BENCH_LATENCY_SAMPLES` | 100000  | round trips recorded per latency run |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Invalid value in one of the bench environment variables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: expected an unsigned integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be positive")]
    Zero { var: &'static str },

    #[error("BENCH_QUEUE: expected all, indexed or sentinel, got {0:?}")]
    UnknownQueue(String),
}

/// One of the two ring variants under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Indexed,
    Sentinel,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Indexed => "indexed",
            Self::Sentinel => "sentinel",
        })
    }
}

/// Which variants a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSelection {
    All,
    Only(QueueKind),
}

impl QueueSelection {
    pub fn kinds(self) -> &'static [QueueKind] {
        match self {
            Self::All => &[QueueKind::Indexed, QueueKind::Sentinel],
            Self::Only(QueueKind::Indexed) => &[QueueKind::Indexed],
            Self::Only(QueueKind::Sentinel) => &[QueueKind::Sentinel],
        }
    }
}

impl FromStr for QueueSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "indexed" => Ok(Self::Only(QueueKind::Indexed)),
            "sentinel" => Ok(Self::Only(QueueKind::Sentinel)),
            _ => Err(ConfigError::UnknownQueue(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub producer_cpu: usize,
    pub consumer_cpu: usize,
    pub duration: Duration,
    pub queue: QueueSelection,
    pub latency_samples: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            producer_cpu: 3,
            consumer_cpu: 1,
            duration: Duration::from_secs(5),
            queue: QueueSelection::All,
            latency_samples: 100_000,
        }
    }
}

impl BenchConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`; unset variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();

        let secs = number(&lookup, "BENCH_SECS")?.unwrap_or(defaults.duration.as_secs());
        if secs == 0 {
            return Err(ConfigError::Zero { var: "BENCH_SECS" });
        }

        let latency_samples =
            number(&lookup, "BENCH_LATENCY_SAMPLES")?.unwrap_or(defaults.latency_samples);
        if latency_samples == 0 {
            return Err(ConfigError::Zero {
                var: "BENCH_LATENCY_SAMPLES",
            });
        }

        let queue = match lookup("BENCH_QUEUE") {
            Some(value) => value.parse()?,
            None => defaults.queue,
        };

        Ok(Self {
            producer_cpu: number(&lookup, "PRODUCER_CPU")?.unwrap_or(defaults.producer_cpu),
            consumer_cpu: number(&lookup, "CONSUMER_CPU")?.unwrap_or(defaults.consumer_cpu),
            duration: Duration::from_secs(secs),
            queue,
            latency_samples,
        })
    }
}

fn number<F, N>(lookup: &F, var: &'static str) -> Result<Option<N>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    N: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var, value })
        })
        .transpose()
}
