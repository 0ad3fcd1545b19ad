//! Retry logic with exponential backoff and jitter.

use std::time::Duration;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`, capped at `max`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to shorten each delay by a random amount of up to 50%.
        /// Jittered delays never exceed `max`.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Calculate the delay before retry number `attempt` (0-based).
    ///
    /// Jitter only ever shortens a delay, and never below the un-jittered
    /// delay of the previous attempt, so a schedule stays non-decreasing.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let ceiling = Self::capped(base, factor, max, attempt);
                if !jitter {
                    return ceiling;
                }

                let ceiling_ms = ceiling.as_millis() as u64;
                let previous_ms = match attempt {
                    0 => 0,
                    n => Self::capped(base, factor, max, n - 1).as_millis() as u64,
                };
                let floor_ms = (ceiling_ms / 2).max(previous_ms).min(ceiling_ms);
                Duration::from_millis(fastrand::u64(floor_ms..=ceiling_ms))
            }
        }
    }

    fn capped(base: Duration, factor: f64, max: Duration, attempt: u32) -> Duration {
        let scale = factor.powi(attempt.min(i32::MAX as u32) as i32);
        let seconds = base.as_secs_f64() * scale;
        Duration::from_secs_f64(seconds.min(max.as_secs_f64()))
    }
}

/// Configuration for the fetch layer's retry loop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff (`base * 2^attempt`, capped at `max`) without jitter.
    pub fn exponential(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max,
                jitter: false,
            },
        }
    }

    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let Backoff::Exponential { ref mut jitter, .. } = self.backoff {
            *jitter = enabled;
        }
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Every delay the retry loop may sleep for, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_retries)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }
}
