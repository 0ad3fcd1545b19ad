//! Cache-first price fetching with bounded retries.
//!
//! [`PriceFetcher::fetch`] is the only place retries happen. A fetch checks
//! the cache, then makes up to `retry.max_attempts()` attempts against the
//! [`PriceSource`], each admitted through the shared [`Throttle`]. Only
//! `RateLimited` and `Transient` failures are retried; a rate-limit signal
//! pauses every worker sharing the throttle rather than just the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheMode, CacheStore};
use crate::policy::FetchPolicy;
use crate::source::{FetchError, FetchErrorKind, HistoryRequest, PriceSource};
use crate::throttle::Throttle;
use crate::PriceSeries;

#[derive(Clone)]
pub struct PriceFetcher {
    source: Arc<dyn PriceSource>,
    cache: CacheStore,
    cache_mode: CacheMode,
    throttle: Throttle,
    policy: FetchPolicy,
}

impl PriceFetcher {
    pub fn new(source: Arc<dyn PriceSource>, cache: CacheStore, policy: FetchPolicy) -> Self {
        Self {
            source,
            cache,
            cache_mode: CacheMode::Use,
            throttle: Throttle::from_policy(&policy),
            policy,
        }
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub async fn fetch(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError> {
        let key = match CacheKey::for_request(request) {
            Ok(key) => Some(key),
            Err(error) => {
                warn!(%request, %error, "could not derive cache key; fetching uncached");
                None
            }
        };

        if self.cache_mode.reads() {
            if let Some(key) = &key {
                if let Some(series) = self.cache.get(key).await {
                    return Ok(series);
                }
            }
        }

        let series = self.fetch_with_retry(request).await?;

        if self.cache_mode.writes() {
            if let Some(key) = &key {
                if let Err(error) = self.cache.put(key, &series, self.policy.cache_ttl).await {
                    warn!(%request, %error, "failed to write price history to cache");
                }
            }
        }

        Ok(series)
    }

    async fn fetch_with_retry(&self, request: &HistoryRequest) -> Result<PriceSeries, FetchError> {
        let retry = &self.policy.retry;
        let max_attempts = retry.max_attempts();
        let mut attempt = 0;

        loop {
            let outcome = {
                let _permit = self.throttle.admit().await;
                self.source.history(request).await
            };
            attempt += 1;

            let error = match outcome {
                Ok(series) => return Ok(series),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(error.with_attempts(attempt));
            }

            let delay = retry.delay_for_attempt(attempt - 1);
            debug!(
                source = self.source.name(),
                %request,
                attempt,
                max_attempts,
                kind = %error.kind(),
                delay_ms = delay.as_millis() as u64,
                "retrying price fetch"
            );

            if error.kind() == FetchErrorKind::RateLimited {
                self.throttle.penalize(delay);
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
