use std::time::Duration;

use crate::retry::{Backoff, RetryConfig};

/// Default validity window for cached price histories.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Concurrency, quota, retry and cache settings for one price source.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_concurrency: usize,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub request_timeout: Duration,
    pub cache_ttl: Duration,
    pub retry: RetryConfig,
}

impl FetchPolicy {
    pub fn upstox_default() -> Self {
        Self {
            max_concurrency: 8,
            quota_window: Duration::from_secs(60),
            quota_limit: 250,
            request_timeout: Duration::from_secs(30),
            cache_ttl: DEFAULT_CACHE_TTL,
            retry: RetryConfig {
                max_retries: 3,
                backoff: Backoff::Exponential {
                    base: Duration::from_secs(1),
                    factor: 2.0,
                    max: Duration::from_secs(30),
                    jitter: true,
                },
            },
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::upstox_default()
    }
}
