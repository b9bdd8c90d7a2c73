//! Per-domain dispatch spacing.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Spaces dispatches to the same domain by at least `min_interval`.
///
/// Each caller atomically reserves the next free slot for its domain and
/// then sleeps until that slot; the lock is never held across an await.
/// Concurrent callers therefore leave in reservation order.
pub struct RateLimiter {
    min_interval: Duration,
    /// domain → most recently reserved dispatch time
    last_dispatch: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until a dispatch to `domain` is allowed, claiming that slot.
    pub async fn until_ready(&self, domain: &str) {
        let slot = self.reserve(domain, Instant::now());
        if slot > Instant::now() {
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Claim the earliest slot at or after `now` that honours the spacing.
    fn reserve(&self, domain: &str, now: Instant) -> Instant {
        let mut table = self.last_dispatch.lock();
        let slot = match table.get(domain) {
            Some(last) => (*last + self.min_interval).max(now),
            None => now,
        };
        table.insert(domain.to_string(), slot);
        slot
    }

    /// Number of domains seen so far.
    pub fn tracked_domains(&self) -> usize {
        self.last_dispatch.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_spaces_same_domain() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let now = Instant::now();
        let a = limiter.reserve("pypi.org", now);
        let b = limiter.reserve("pypi.org", now);
        let c = limiter.reserve("pypi.org", now);
        assert_eq!(a, now);
        assert_eq!(b - a, Duration::from_millis(100));
        assert_eq!(c - b, Duration::from_millis(100));
    }

    #[test]
    fn test_domains_are_independent() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let now = Instant::now();
        limiter.reserve("pypi.org", now);
        assert_eq!(limiter.reserve("libraries.io", now), now);
        assert_eq!(limiter.tracked_domains(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_waits_out_the_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(250));
        let start = Instant::now();
        limiter.until_ready("pypi.org").await;
        limiter.until_ready("pypi.org").await;
        limiter.until_ready("pypi.org").await;
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_domain_dispatches_immediately() {
        let limiter = RateLimiter::new(Duration::from_millis(250));
        limiter.until_ready("pypi.org").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let start = Instant::now();
        limiter.until_ready("pypi.org").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
