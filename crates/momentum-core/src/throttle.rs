//! Shared admission control for outgoing price requests.
//!
//! Every worker in a run goes through the same [`Throttle`]: a semaphore caps
//! in-flight requests, a `governor` limiter enforces the provider quota, and a
//! shared cooldown deadline lets one worker's rate-limit signal pause all of
//! them.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::policy::FetchPolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<DirectRateLimiter>,
    slots: Arc<Semaphore>,
    cooldown_until: Arc<Mutex<Option<Instant>>>,
}

/// Held for the duration of one external request.
#[derive(Debug)]
pub struct ThrottlePermit {
    _slot: OwnedSemaphorePermit,
}

impl Throttle {
    pub fn new(max_concurrency: usize, quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
            cooldown_until: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_policy(policy: &FetchPolicy) -> Self {
        Self::new(policy.max_concurrency, policy.quota_window, policy.quota_limit)
    }

    /// Waits for a concurrency slot, any shared cooldown, and quota budget.
    pub async fn admit(&self) -> ThrottlePermit {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("throttle semaphore is never closed");

        while let Some(deadline) = self.active_cooldown() {
            tokio::time::sleep_until(deadline).await;
        }

        self.limiter.until_ready().await;
        ThrottlePermit { _slot: slot }
    }

    /// Pushes the shared cooldown at least `delay` into the future.
    pub fn penalize(&self, delay: Duration) {
        let candidate = Instant::now() + delay;
        let mut cooldown = self
            .cooldown_until
            .lock()
            .expect("throttle cooldown lock should not be poisoned");
        match *cooldown {
            Some(current) if current >= candidate => {}
            _ => *cooldown = Some(candidate),
        }
    }

    /// Time left before workers may issue requests again.
    pub fn cooldown_remaining(&self) -> Duration {
        self.active_cooldown()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn active_cooldown(&self) -> Option<Instant> {
        let mut cooldown = self
            .cooldown_until
            .lock()
            .expect("throttle cooldown lock should not be poisoned");
        match *cooldown {
            Some(deadline) if deadline > Instant::now() => Some(deadline),
            Some(_) => {
                *cooldown = None;
                None
            }
            None => None,
        }
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_bounded_by_concurrency() {
        let throttle = Throttle::new(2, Duration::from_secs(1), 1_000);

        let first = throttle.admit().await;
        let _second = throttle.admit().await;
        assert_eq!(throttle.available_slots(), 0);

        drop(first);
        assert_eq!(throttle.available_slots(), 1);
    }

    #[tokio::test]
    async fn penalty_is_shared_between_clones() {
        let throttle = Throttle::new(4, Duration::from_secs(1), 1_000);
        let worker = throttle.clone();

        worker.penalize(Duration::from_millis(80));
        assert!(throttle.cooldown_remaining() > Duration::ZERO);

        let started = std::time::Instant::now();
        let _permit = throttle.admit().await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn shorter_penalty_does_not_shrink_cooldown() {
        let throttle = Throttle::new(1, Duration::from_secs(1), 1_000);

        throttle.penalize(Duration::from_secs(5));
        throttle.penalize(Duration::from_millis(1));
        assert!(throttle.cooldown_remaining() > Duration::from_secs(4));
    }
}
