//! TTL cache for serialized read responses.
//!
//! Entries are keyed by route + normalized query string (see [`cache_key`]).
//! Expired entries read as a miss and are dropped on that lookup. Handlers that
//! change a collection call [`ResponseCache::invalidate_prefix`] before they
//! respond, so the next read of that collection goes to the store.
//!
//! A read that misses snapshots [`ResponseCache::generation`] before going to
//! the store and fills with [`ResponseCache::set_if_fresh`]. Any invalidation in
//! between moves the generation and the fill is dropped, so an in-flight read
//! cannot put back a snapshot that a mutation has already cleared.
//!
//! Nothing here returns an error. A disabled cache always misses and ignores
//! writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    generation: AtomicU64,
    enabled: bool,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ResponseCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => None,
            None => {
                tracing::debug!("cache miss: {}", key);
                return None;
            }
        };

        if hit.is_some() {
            tracing::debug!("cache hit: {}", key);
            return hit;
        }

        // Only remove if nobody refreshed it since the read above.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        tracing::debug!("cache expired: {}", key);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Bytes, ttl: Duration) {
        if !self.enabled || ttl.is_zero() {
            return;
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.into(), entry);
    }

    /// Bumped by every invalidation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation happened after `seen` was read.
    ///
    /// The generation is checked while holding the key's shard lock, and
    /// invalidations bump it before they sweep, so a fill either loses the race
    /// here or is removed by the sweep.
    pub fn set_if_fresh(&self, key: impl Into<String>, value: Bytes, ttl: Duration, seen: u64) -> bool {
        if !self.enabled || ttl.is_zero() {
            return false;
        }

        let slot = self.entries.entry(key.into());
        if self.generation() != seen {
            tracing::debug!("cache fill dropped after invalidation: {}", slot.key());
            return false;
        }
        slot.insert(CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        });
        true
    }

    pub fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.entries.remove(key).is_some() {
            tracing::debug!("cache invalidated: {}", key);
        }
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!("cache invalidated {} entries under {}", removed, prefix);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deterministic key for `route` and its query parameters. Parameters are
/// sorted by name then value, so `?b=2&a=1` and `?a=1&b=2` share an entry.
/// Names and values are form-encoded, so a `&` or `=` inside one cannot
/// collide with another parameter set.
pub fn cache_key<'a, I>(route: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = params.into_iter().collect();
    if pairs.is_empty() {
        return route.to_string();
    }
    pairs.sort_unstable();

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{}?{}", route, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_get_before_and_after_ttl() {
        let cache = ResponseCache::new(true);
        cache.set("/customers", Bytes::from_static(b"[1]"), TTL);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("/customers"), Some(Bytes::from_static(b"[1]")));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("/customers"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_with_fresh_expiry() {
        let cache = ResponseCache::new(true);
        cache.set("k", Bytes::from_static(b"old"), TTL);
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("k", Bytes::from_static(b"new"), TTL);
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k"), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_miss() {
        let cache = ResponseCache::new(true);
        cache.set("/mechanics", Bytes::from_static(b"a"), TTL);
        cache.invalidate("/mechanics");
        assert_eq!(cache.get("/mechanics"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_prefix_spares_other_collections() {
        let cache = ResponseCache::new(true);
        cache.set("/mechanics", Bytes::from_static(b"a"), TTL);
        cache.set("/mechanics/most-active", Bytes::from_static(b"b"), TTL);
        cache.set("/inventory", Bytes::from_static(b"c"), TTL);

        cache.invalidate_prefix("/mechanics");

        assert_eq!(cache.get("/mechanics"), None);
        assert_eq!(cache.get("/mechanics/most-active"), None);
        assert_eq!(cache.get("/inventory"), Some(Bytes::from_static(b"c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_after_invalidation_is_dropped() {
        let cache = ResponseCache::new(true);
        let seen = cache.generation();

        // A mutation lands while the read is still loading
        cache.invalidate_prefix("/mechanics");

        assert!(!cache.set_if_fresh("/mechanics", Bytes::from_static(b"old"), TTL, seen));
        assert_eq!(cache.get("/mechanics"), None);

        let seen = cache.generation();
        assert!(cache.set_if_fresh("/mechanics", Bytes::from_static(b"new"), TTL, seen));
        assert_eq!(cache.get("/mechanics"), Some(Bytes::from_static(b"new")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cache_always_misses() {
        let cache = ResponseCache::disabled();
        cache.set("k", Bytes::from_static(b"v"), TTL);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_cache_key_normalizes_parameter_order() {
        let a = cache_key("/customers", [("per_page", "10"), ("page", "2")]);
        let b = cache_key("/customers", [("page", "2"), ("per_page", "10")]);
        assert_eq!(a, b);
        assert_eq!(a, "/customers?page=2&per_page=10");
        assert_eq!(cache_key("/inventory", []), "/inventory");
    }

    #[test]
    fn test_cache_key_escapes_separators() {
        let joined = cache_key("/search", [("q", "a&b=c")]);
        let split = cache_key("/search", [("q", "a"), ("b", "c")]);
        assert_ne!(joined, split);
        assert_eq!(joined, "/search?q=a%26b%3Dc");
    }
}
