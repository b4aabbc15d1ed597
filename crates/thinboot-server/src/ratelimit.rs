//! Per-key request rate limiting for the unauthenticated endpoints.
//!
//! Each key (caller IP, or device MAC for ingestion) keeps the instants of
//! its admitted requests inside the last window. A request is admitted while
//! fewer than `limit` instants remain after pruning; rejected requests are not
//! recorded. Instants older than the window are dropped on the next access to
//! that key, and [`RateLimiter::prune`] drops keys that have gone idle.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Sliding-window request limiter shared across handlers.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Record a request for `key` now. Returns `false` if it must be rejected.
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    /// Record a request for `key` at `now`.
    pub async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock().await;
        let log = hits.entry(key.to_string()).or_default();

        while log
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            log.pop_front();
        }

        if log.len() >= self.limit {
            return false;
        }
        log.push_back(now);
        true
    }

    /// Drop keys with no request inside the window. Returns how many went.
    pub async fn prune(&self) -> usize {
        self.prune_at(Instant::now()).await
    }

    pub async fn prune_at(&self, now: Instant) -> usize {
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, log| {
            log.back()
                .is_some_and(|t| now.saturating_duration_since(*t) < self.window)
        });
        before - hits.len()
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.hits.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn hundredth_passes_hundred_and_first_fails() {
        let limiter = RateLimiter::new(100, WINDOW);
        let start = Instant::now();

        for i in 0..100 {
            let at = start + Duration::from_millis(i * 10);
            assert!(limiter.check_at("10.0.0.1", at).await, "request {i}");
        }
        assert!(
            !limiter
                .check_at("10.0.0.1", start + Duration::from_secs(5))
                .await
        );
    }

    #[tokio::test]
    async fn admits_again_after_window_elapses() {
        let limiter = RateLimiter::new(2, WINDOW);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).await);
        assert!(limiter.check_at("k", start).await);
        assert!(!limiter.check_at("k", start + Duration::from_secs(59)).await);
        assert!(limiter.check_at("k", start + WINDOW).await);
    }

    #[tokio::test]
    async fn rejections_do_not_extend_the_window() {
        let limiter = RateLimiter::new(1, WINDOW);
        let start = Instant::now();

        assert!(limiter.check_at("k", start).await);
        for s in 1..60 {
            assert!(!limiter.check_at("k", start + Duration::from_secs(s)).await);
        }
        assert!(limiter.check_at("k", start + WINDOW).await);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, WINDOW);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).await);
        assert!(!limiter.check_at("a", now).await);
        assert!(limiter.check_at("b", now).await);
    }

    #[tokio::test]
    async fn prune_drops_idle_keys() {
        let limiter = RateLimiter::new(5, WINDOW);
        let start = Instant::now();
        limiter.check_at("old", start).await;
        limiter.check_at("fresh", start + Duration::from_secs(30)).await;

        assert_eq!(limiter.prune_at(start + Duration::from_secs(61)).await, 1);
        assert_eq!(limiter.tracked_keys().await, 1);
    }

    #[tokio::test]
    async fn concurrent_checks_never_over_admit() {
        let limiter = std::sync::Arc::new(RateLimiter::new(50, WINDOW));
        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("shared").await })
            })
            .collect();

        let mut admitted = 0;
        for t in tasks {
            if t.await.unwrap_or(false) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 50);
    }
}
