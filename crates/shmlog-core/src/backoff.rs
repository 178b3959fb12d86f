//! Bounded exponential backoff shared by the producer and consumer retry loops

use crate::config::BackoffConfig;
use std::thread;
use std::time::Duration;

/// Sleep-based backoff state for one retry loop
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    delay: Duration,
    retries: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            delay: config.initial,
            retries: 0,
        }
    }

    /// Number of sleeps taken since creation or the last reset
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Delay the next snooze will sleep, before clamping
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.config.max_retries, Some(max) if self.retries >= max)
    }

    pub fn reset(&mut self) {
        self.delay = self.config.initial;
        self.retries = 0;
    }

    /// Sleep the current delay, at most `limit`, then double the delay up to the cap.
    ///
    /// Returns the time slept.
    pub fn snooze(&mut self, limit: Option<Duration>) -> Duration {
        let sleep = match limit {
            Some(limit) => self.delay.min(limit),
            None => self.delay,
        };
        thread::sleep(sleep);
        self.retries = self.retries.saturating_add(1);
        self.delay = self.delay.saturating_mul(2).min(self.config.max);
        sleep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_retries: Option<u32>) -> BackoffConfig {
        BackoffConfig {
            initial: Duration::from_micros(1),
            max: Duration::from_micros(4),
            max_retries,
        }
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let mut backoff = Backoff::new(config(None));
        let slept: Vec<_> = (0..5).map(|_| backoff.snooze(None)).collect();
        assert_eq!(
            slept,
            [1, 2, 4, 4, 4].map(Duration::from_micros).to_vec()
        );
        assert_eq!(backoff.retries(), 5);
        assert!(!backoff.is_exhausted());
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut backoff = Backoff::new(config(Some(2)));
        assert!(!backoff.is_exhausted());
        backoff.snooze(None);
        backoff.snooze(None);
        assert!(backoff.is_exhausted());

        backoff.reset();
        assert!(!backoff.is_exhausted());
        assert_eq!(backoff.current_delay(), Duration::from_micros(1));
    }

    #[test]
    fn test_snooze_clamped_to_limit() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(10),
            max_retries: None,
        });
        let slept = backoff.snooze(Some(Duration::from_millis(1)));
        assert_eq!(slept, Duration::from_millis(1));
    }
}
