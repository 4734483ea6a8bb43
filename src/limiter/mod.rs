//! Fixed-window admission control keyed by client + route.
//!
//! Each key owns a `(count, window_start)` pair. The whole read-compare-increment
//! for a key happens while holding that key's map entry, so concurrent callers
//! on one key are serialized and can never both slip under the limit. Unrelated
//! keys live in other shards and do not contend.
//!
//! A window resets once `now - window_start >= window`; a client can therefore
//! land up to `2 * limit` requests around a boundary.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A limit of `requests` per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRule {
    pub requests: u32,
    pub window_secs: u64,
}

impl RateRule {
    pub fn new(requests: u32, window_secs: u64) -> Self {
        Self { requests, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and admit the request if the key is under `limit` for its current
    /// window. A denied request is not counted.
    pub fn admit(&self, key: &str, limit: u32, window: Duration) -> bool {
        if limit == 0 {
            return false;
        }

        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { count: 0, started: now });

        let state = entry.value_mut();
        if now.duration_since(state.started) >= window {
            state.count = 0;
            state.started = now;
        }

        if state.count < limit {
            state.count += 1;
            true
        } else {
            false
        }
    }

    pub fn admit_rule(&self, key: &str, rule: RateRule) -> bool {
        self.admit(key, rule.requests, rule.window())
    }

    /// Drop windows that ended more than `max_window` ago. Optional; stale
    /// windows are otherwise reset lazily on their next lookup.
    pub fn purge_expired(&self, max_window: Duration) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < max_window);
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Rate key for a client hitting a named route
pub fn rate_key(client: &str, route: &str) -> String {
    format!("{}|{}", route, client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_deny_within_window() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert!(limiter.admit("k", 5, HOUR));
        }
        assert!(!limiter.admit("k", 5, HOUR));
        assert!(!limiter.admit("k", 5, HOUR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_elapsed() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.admit("k", 3, HOUR));
        }
        assert!(!limiter.admit("k", 3, HOUR));

        tokio::time::advance(HOUR - Duration::from_secs(1)).await;
        assert!(!limiter.admit("k", 3, HOUR));

        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..3 {
            assert!(limiter.admit("k", 3, HOUR));
        }
        assert!(!limiter.admit("k", 3, HOUR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boundary_burst_is_permitted() {
        let limiter = RateLimiter::new();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("k", 2, window));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(limiter.admit("k", 2, window));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.admit("k", 2, window));
        assert!(limiter.admit("k", 2, window));
        assert!(!limiter.admit("k", 2, window));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.admit(&rate_key("10.0.0.1", "customers.create"), 1, HOUR));
        assert!(!limiter.admit(&rate_key("10.0.0.1", "customers.create"), 1, HOUR));
        assert!(limiter.admit(&rate_key("10.0.0.2", "customers.create"), 1, HOUR));
        assert!(limiter.admit(&rate_key("10.0.0.1", "customers.login"), 1, HOUR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_denies() {
        let limiter = RateLimiter::new();
        assert!(!limiter.admit("k", 0, HOUR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.admit("a", 1, HOUR);
        limiter.admit("b", 1, HOUR);
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::advance(HOUR).await;
        limiter.purge_expired(HOUR);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new());
        let limit = 7;
        let attempts = 64;

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit("shared", limit, HOUR) })
            })
            .collect();

        let admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        assert_eq!(admitted, limit as usize);
    }
}
