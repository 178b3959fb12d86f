//! Engine configuration

use crate::layout::DEFAULT_CAPACITY;
use crate::storage::ConsumerMode;
use std::time::Duration;

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// First sleep
    pub initial: Duration,
    /// Cap for the doubling delay
    pub max: Duration,
    /// Give up after this many sleeps, `None` for no limit
    pub max_retries: Option<u32>,
}

impl BackoffConfig {
    /// Producer waiting on a full buffer: about 130ms in total before it overwrites.
    pub const PRODUCER: Self = Self {
        initial: Duration::from_micros(64),
        max: Duration::from_millis(32),
        max_retries: Some(12),
    };

    /// Consumer waiting on an empty buffer, bounded by the read timeout.
    pub const CONSUMER: Self = Self {
        initial: Duration::from_micros(2),
        max: Duration::from_micros(65_536),
        max_retries: None,
    };
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Number of slots
    pub capacity: usize,
    /// Segment identity, defaults to the current process id
    pub identity: Option<i32>,
    /// Unlink a leftover segment with the same identity before creating
    pub remove_stale: bool,
    /// Full-buffer wait while a live consumer is registered
    pub backoff: BackoffConfig,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            identity: None,
            remove_stale: false,
            backoff: BackoffConfig::PRODUCER,
        }
    }
}

impl ProducerConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub mode: ConsumerMode,
    /// Identity used for registration, defaults to the current process id
    pub identity: Option<i32>,
    /// Empty-buffer wait
    pub backoff: BackoffConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            mode: ConsumerMode::default(),
            identity: None,
            backoff: BackoffConfig::CONSUMER,
        }
    }
}

impl ConsumerConfig {
    pub fn blocking() -> Self {
        Self {
            mode: ConsumerMode::Blocking,
            ..Self::default()
        }
    }

    pub fn non_blocking() -> Self {
        Self::default()
    }
}
