//! Bounded in-memory LRU tier.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

/// A cached value with expiration time and access stamp.
struct CacheEntry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
    last_accessed: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    /// Monotonic access counter; higher means more recent.
    clock: u64,
    hits: u64,
    misses: u64,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Make room for one new entry: expired entries go first, then the
    /// least recently accessed one.
    fn evict_for_insert(&mut self, max_size: usize, now: Instant) {
        if self.entries.len() < max_size {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired(now));

        while self.entries.len() >= max_size {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

/// Memory tier statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Least-recently-used cache with per-entry TTL.
///
/// Reads and writes both count as access. Expired entries are dropped
/// lazily when read or when space is needed.
pub struct LruCache {
    max_size: usize,
    default_ttl: Duration,
    state: Mutex<MemoryState>,
}

impl LruCache {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.lock();
        let stamp = state.tick();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                entry.last_accessed = stamp;
                let value = entry.value.clone();
                state.hits += 1;
                return Some(value);
            }
            None => false,
        };

        if expired {
            state.entries.remove(key);
        }
        state.misses += 1;
        None
    }

    /// Store `value` under `key`, evicting if the cache is full.
    /// `ttl` of `None` uses the default TTL.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        if self.max_size == 0 {
            return;
        }
        let now = Instant::now();
        let expires_at = now.checked_add(ttl.unwrap_or(self.default_ttl));
        let mut state = self.lock();
        let stamp = state.tick();

        if !state.entries.contains_key(key) {
            state.evict_for_insert(self.max_size, now);
        }
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at,
                last_accessed: stamp,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    /// Drop every entry, returning how many were held.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MemoryStats {
        let state = self.lock();
        MemoryStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> LruCache {
        LruCache::new(3, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = cache();
        cache.set("key1", json!("value1"), None);
        assert_eq!(cache.get("key1"), Some(json!("value1")));
        assert_eq!(cache.get("missing"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = cache();
        cache.set("forever", json!(1), Some(Duration::MAX));
        assert_eq!(cache.get("forever"), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = cache();
        cache.set("key1", json!("value1"), Some(Duration::from_millis(100)));
        tokio::time::advance(Duration::from_millis(150)).await;

        assert_eq!(cache.get("key1"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction_respects_reads() {
        let cache = cache();
        cache.set("A", json!(1), None);
        cache.set("B", json!(2), None);
        cache.set("C", json!(3), None);

        // A becomes most recent, B is now the oldest
        cache.get("A");
        cache.set("D", json!(4), None);

        assert_eq!(cache.get("A"), Some(json!(1)));
        assert_eq!(cache.get("B"), None);
        assert_eq!(cache.get("C"), Some(json!(3)));
        assert_eq!(cache.get("D"), Some(json!(4)));
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = cache();
        cache.set("A", json!(1), None);
        cache.set("B", json!(2), None);
        cache.set("C", json!(3), None);
        cache.set("A", json!(10), None);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("A"), Some(json!(10)));
        assert_eq!(cache.get("B"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = cache();
        cache.set("key1", json!({"nested": {"key": "value"}, "list": [1, 2, 3]}), None);
        cache.set("key2", json!("value2"), None);

        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));
        assert_eq!(cache.get("key2"), Some(json!("value2")));

        assert_eq!(cache.clear(), 1);
        assert_eq!(cache.get("key2"), None);
    }
}
