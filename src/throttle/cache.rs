//! TTL cache for external API responses.

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cache entry with value and expiration.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL overflows `Instant`
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Key-value cache whose entries expire after a per-entry TTL.
///
/// Expired entries are dropped lazily when their key is next read; there is
/// no background sweep. Concurrent writers to one key resolve last-write-wins.
#[derive(Debug)]
pub struct ResponseCache<V = JsonValue> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value for a key if it has not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Stores a value for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Returns the value for a key as of `now`.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                tracing::trace!(key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                tracing::trace!(key, "Cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Stores a value that expires `ttl` after `now`.
    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
    }

    /// Removes a key, returning its value if it was still live.
    pub fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_returns_value_before_expiry() {
        let cache = ResponseCache::new();
        let now = Instant::now();
        cache.set_at("weather", json!({"temp": 21}), Duration::from_millis(100), now);

        assert_eq!(
            cache.get_at("weather", now + Duration::from_millis(99)),
            Some(json!({"temp": 21}))
        );
    }

    #[test]
    fn get_at_expiry_instant_is_absent() {
        let cache: ResponseCache<String> = ResponseCache::new();
        let now = Instant::now();
        cache.set_at("k", "v".to_string(), Duration::from_millis(100), now);

        assert_eq!(cache.get_at("k", now + Duration::from_millis(100)), None);
    }

    #[test]
    fn expired_entries_stay_until_touched() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        let now = Instant::now();
        cache.set_at("a", 1, Duration::from_millis(10), now);
        cache.set_at("b", 2, Duration::from_millis(10), now);

        let later = now + Duration::from_secs(1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("a", later), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_overwrites_and_extends() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        let now = Instant::now();
        cache.set_at("k", 1, Duration::from_millis(10), now);
        cache.set_at("k", 2, Duration::from_secs(10), now);

        assert_eq!(cache.get_at("k", now + Duration::from_secs(1)), Some(2));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("k", 7, Duration::MAX);

        assert_eq!(cache.get("k"), Some(7));
    }

    #[test]
    fn remove_and_clear() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.set("a", 1, Duration::from_secs(60));
        cache.set("b", 2, Duration::from_secs(60));

        assert_eq!(cache.remove("a"), Some(1));
        assert_eq!(cache.remove("a"), None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn wall_clock_expiry() {
        let cache = ResponseCache::new();
        cache.set("k", json!("v"), Duration::from_millis(100));
        assert_eq!(cache.get("k"), Some(json!("v")));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);
    }
}
