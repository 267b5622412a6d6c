//! Cache primitives shared by the document manager and the merger cache.
//!
//! # Architecture
//!
//! - [`ExpiringLruCache<K, V>`]: bounded map with LRU eviction and a time-to-live
//! - [`IndexedLruCache<K, S, V>`]: [`ExpiringLruCache`] plus a secondary index
//!   (`S` → most recent `K`) for point invalidation by an external key
//! - [`CacheStats`]: hit/miss counters for observability
//! - [`fnv1a_32`]: non-cryptographic string hash used to build cache keys
//!
//! Expiry is measured with [`tokio::time::Instant`] so that tests running on a
//! paused clock can advance past a TTL deterministically.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded cache with least-recently-used eviction and per-entry TTL.
///
/// Reads refresh recency but not age: an entry expires `ttl` after it was
/// inserted regardless of how often it is read. Expired entries are purged
/// lazily on access.
#[derive(Debug)]
pub struct ExpiringLruCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    access_order: VecDeque<K>,
    max_capacity: usize,
    ttl: Duration,
}

impl<K, V> ExpiringLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `max_capacity` entries for `ttl` each.
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(max_capacity),
            access_order: VecDeque::with_capacity(max_capacity),
            max_capacity: max_capacity.max(1),
            ttl,
        }
    }

    /// Get a clone of the cached value, refreshing its recency.
    ///
    /// Returns `None` (and drops the entry) if it has outlived the TTL.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            self.remove(key);
            return None;
        }

        self.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whether a live entry exists for `key`. Does not refresh recency.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.inserted_at.elapsed() < self.ttl)
    }

    /// Insert or replace a value, evicting the least recently used entry if full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.touch(&key);
        } else {
            self.purge_expired();
            while self.entries.len() >= self.max_capacity {
                match self.access_order.pop_front() {
                    Some(lru_key) => {
                        self.entries.remove(&lru_key);
                    }
                    None => break,
                }
            }
            self.access_order.push_back(key.clone());
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.entries.remove(key)?;
        self.access_order.retain(|k| k != key);
        Some(removed.value)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
    }

    /// Number of entries currently held, including not-yet-purged expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Linear in the entry count. Both users cap their caches at 100 entries,
    // where a scan beats maintaining a linked order.
    fn touch(&mut self, key: &K) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(key.clone());
    }

    fn purge_expired(&mut self) {
        let ttl = self.ttl;
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
    }
}

/// An [`ExpiringLruCache`] with a secondary index for external invalidation.
///
/// Each secondary key (for example a document URI) maps to at most one live
/// primary key. Registering a new primary key for a secondary key evicts the
/// entry stored under the previous one.
#[derive(Debug)]
pub struct IndexedLruCache<K, S, V> {
    cache: ExpiringLruCache<K, V>,
    index: HashMap<S, K>,
}

impl<K, S, V> IndexedLruCache<K, S, V>
where
    K: Eq + Hash + Clone,
    S: Eq + Hash,
    V: Clone,
{
    pub fn new(max_capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: ExpiringLruCache::new(max_capacity, ttl),
            index: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.cache.insert(key, value);
    }

    /// Record `key` as the live key for `secondary`, evicting the previous one.
    ///
    /// Re-registering the same key is a no-op so a cached value survives.
    pub fn register(&mut self, key: K, secondary: S) {
        if let Some(previous) = self.index.get(&secondary) {
            if *previous == key {
                return;
            }
            let previous = previous.clone();
            self.cache.remove(&previous);
        }
        self.index.insert(secondary, key);
    }

    /// Evict the entry registered for `secondary` and forget the registration.
    ///
    /// Returns `true` if a registration existed.
    pub fn invalidate(&mut self, secondary: &S) -> bool {
        match self.index.remove(secondary) {
            Some(key) => {
                self.cache.remove(&key);
                true
            }
            None => false,
        }
    }

    /// The live key registered for `secondary`, if any.
    pub fn registered_key(&self, secondary: &S) -> Option<&K> {
        self.index.get(secondary)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Hit/miss counters for cache effectiveness monitoring.
///
/// Logged when the `MINISCRIPT_LSP_CACHE_STATS` environment variable is set.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Total cache hits.
    pub hits: usize,
    /// Total cache misses.
    pub misses: usize,
}

impl CacheStats {
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Hit rate as a fraction (0.0 to 1.0). Returns 0.0 if no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Log stats if `MINISCRIPT_LSP_CACHE_STATS` environment variable is set.
    pub fn maybe_log(&self, cache_name: &str) {
        if std::env::var("MINISCRIPT_LSP_CACHE_STATS").is_ok() {
            tracing::info!(
                "Cache stats [{}]: hits={}, misses={}, hit_rate={:.1}%",
                cache_name,
                self.hits,
                self.misses,
                self.hit_rate() * 100.0
            );
        }
    }
}

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash of a string.
///
/// Stable across processes and platforms, unlike `DefaultHasher`.
pub fn fnv1a_32(text: &str) -> u32 {
    text.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
