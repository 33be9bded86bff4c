//! A bounded, size-limited response cache with LRU eviction.
//!
//! Reads (`get`) only need a shared read lock on the directory: recency is
//! tracked with a per-entry atomic tick, the same pattern the lock-free
//! counters on a backend use elsewhere in this codebase, so a hit never
//! blocks another concurrent hit. Only `put`/eviction/`clear` take the
//! exclusive write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::message::Headers;

/// An immutable response body stored in the cache. Shared via `Arc` so a
/// concurrent hit never copies the body.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// `"HTTP/1.0"` or `"HTTP/1.1"`, as the origin sent it.
    pub version: String,
    /// Status code. Only `200` is ever admitted (see [`Cache::is_admissible`]).
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers at the time of caching, already rewritten.
    pub headers: Headers,
    /// Response body bytes.
    pub body: Arc<[u8]>,
}

struct CacheEntry {
    response: Arc<CachedResponse>,
    size: u64,
    last_access: AtomicU64,
}

/// Point-in-time cache occupancy and hit/miss counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    /// Number of entries currently stored.
    pub entries: u64,
    /// Sum of all stored response body sizes, in bytes.
    pub total_bytes: u64,
    /// Total successful `get` lookups since the cache (or its counters) was
    /// last reset.
    pub hits: u64,
    /// Total unsuccessful `get` lookups since the cache (or its counters)
    /// was last reset.
    pub misses: u64,
    /// `hits / (hits + misses)`, or `0.0` when no lookups have occurred.
    pub hit_rate: f64,
}

/// A bounded LRU cache keyed by normalized URL.
pub struct Cache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    tick: AtomicU64,
    total_bytes: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    max_object_bytes: u64,
    max_cache_bytes: u64,
}

impl Cache {
    /// Creates an empty cache bounded by `max_object_bytes` (the largest
    /// single response body admitted) and `max_cache_bytes` (the total
    /// budget across all entries, enforced by evicting the least recently
    /// used entries).
    pub fn new(max_object_bytes: u64, max_cache_bytes: u64) -> Self {
        Cache {
            entries: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            max_object_bytes,
            max_cache_bytes,
        }
    }

    /// True if a response with this method/status/body length is eligible
    /// for storage at all: only `GET` responses with a `200` status and a
    /// body no larger than `max_object_bytes` are cacheable. A response of
    /// exactly `max_object_bytes` is admitted; one byte larger is not.
    pub fn is_admissible(&self, is_get: bool, status: u16, body_len: u64) -> bool {
        is_get && status == 200 && body_len <= self.max_object_bytes
    }

    /// Looks up `key`, bumping its recency on a hit. Every call counts
    /// towards `hits` or `misses`, so `hits + misses` always equals the
    /// number of `get` calls made.
    pub fn get(&self, key: &str) -> Option<Arc<CachedResponse>> {
        let entries = self.entries.read().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) => {
                let now = self.tick.fetch_add(1, Ordering::Relaxed);
                entry.last_access.store(now, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.response.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `response` under `key` if admissible, evicting least recently
    /// used entries first if needed to stay within `max_cache_bytes`.
    /// Returns `true` if the response was stored.
    pub fn put(&self, key: String, response: CachedResponse, is_get: bool) -> bool {
        let body_len = response.body.len() as u64;
        if !self.is_admissible(is_get, response.status, body_len) {
            return false;
        }

        let mut entries = self.entries.write().expect("cache lock poisoned");

        if let Some(old) = entries.remove(&key) {
            self.total_bytes.fetch_sub(old.size, Ordering::Relaxed);
        }

        while self.total_bytes.load(Ordering::Relaxed) + body_len > self.max_cache_bytes && !entries.is_empty() {
            let evict_key = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            match evict_key {
                Some(k) => {
                    if let Some(evicted) = entries.remove(&k) {
                        self.total_bytes.fetch_sub(evicted.size, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }

        if body_len > self.max_cache_bytes {
            return false;
        }

        let now = self.tick.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key,
            Arc::new(CacheEntry {
                response: Arc::new(response),
                size: body_len,
                last_access: AtomicU64::new(now),
            }),
        );
        self.total_bytes.fetch_add(body_len, Ordering::Relaxed);
        true
    }

    /// Empties the cache's entries and resets occupancy to zero. `hits` and
    /// `misses` are left untouched: they count lookups made over the
    /// cache's lifetime, not its current contents.
    pub fn clear(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.clear();
        self.total_bytes.store(0, Ordering::Relaxed);
    }

    /// A snapshot of current occupancy and cumulative hit/miss counts.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("cache lock poisoned");
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: entries.len() as u64,
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// True if `key` is currently present, without affecting recency or the
    /// hit/miss counters. Used for the pre-pipeline cache-tag logged on every
    /// request — the pipeline's own `get`/`put` calls remain the only ones
    /// that count towards [`CacheStats`].
    pub fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.read().expect("cache lock poisoned");
        entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(body: &[u8]) -> CachedResponse {
        CachedResponse {
            version: "HTTP/1.1".to_string(),
            status: 200,
            reason: "OK".to_string(),
            headers: Headers::new(),
            body: Arc::from(body),
        }
    }

    #[test]
    fn exact_max_object_bytes_is_admitted_one_more_is_not() {
        let cache = Cache::new(4, 1024);
        assert!(cache.is_admissible(true, 200, 4));
        assert!(!cache.is_admissible(true, 200, 5));
    }

    #[test]
    fn only_get_200_is_admissible() {
        let cache = Cache::new(1024, 1024);
        assert!(!cache.is_admissible(false, 200, 10));
        assert!(!cache.is_admissible(true, 404, 10));
    }

    #[test]
    fn hits_plus_misses_equals_get_calls() {
        let cache = Cache::new(1024, 1024);
        cache.put("k".to_string(), resp(b"hello"), true);
        cache.get("k");
        cache.get("missing");
        cache.get("k");
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn get_touches_recency_mru_on_get() {
        let cache = Cache::new(1024, 10);
        cache.put("a".to_string(), resp(b"12345"), true);
        cache.put("b".to_string(), resp(b"12345"), true);
        cache.get("a");
        cache.put("c".to_string(), resp(b"12345"), true);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn exact_fit_lru_eviction() {
        let cache = Cache::new(1024, 10);
        cache.put("a".to_string(), resp(b"12345"), true);
        cache.put("b".to_string(), resp(b"12345"), true);
        assert_eq!(cache.stats().total_bytes, 10);
        cache.put("c".to_string(), resp(b"12345"), true);
        assert_eq!(cache.stats().total_bytes, 10);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn hit_rate_reflects_cumulative_hits_and_misses() {
        let cache = Cache::new(1024, 1024);
        cache.put("k".to_string(), resp(b"hello"), true);
        cache.get("k");
        cache.get("missing");
        assert_eq!(cache.stats().hit_rate, 0.5);
    }

    #[test]
    fn contains_key_does_not_affect_counters() {
        let cache = Cache::new(1024, 1024);
        cache.put("k".to_string(), resp(b"hello"), true);
        assert!(cache.contains_key("k"));
        assert!(!cache.contains_key("missing"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn clear_resets_entries_but_not_hit_miss_counters() {
        let cache = Cache::new(1024, 1024);
        cache.put("a".to_string(), resp(b"x"), true);
        cache.get("a");
        cache.get("missing");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
