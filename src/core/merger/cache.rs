use crate::core::cache::{fnv1a_32, CacheStats, IndexedLruCache};
use crate::core::TextDocument;
use crate::types::TypeDocument;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Shared cache of merged type views, keyed by the versions they were built
/// from, with a URI index for point invalidation.
///
/// Every [`flush_cache`](Self::flush_cache) starts a new generation. A merge
/// records the generation it started in and its result is only stored if no
/// flush happened meanwhile, so a view built under old settings never
/// outlives the flush.
#[derive(Debug)]
pub struct DocumentMergerCache {
    cache: Mutex<IndexedLruCache<u32, String, Arc<TypeDocument>>>,
    generation: AtomicU64,
    stats: Mutex<CacheStats>,
}

impl Default for DocumentMergerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentMergerCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_limits(max_capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(IndexedLruCache::new(max_capacity, ttl)),
            generation: AtomicU64::new(0),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Key for a view of `source` built from `dependencies`.
    ///
    /// The dependency hashes are XOR-folded, so enumeration order does not
    /// matter; repeated (uri, version) pairs are counted once so they cannot
    /// cancel each other out.
    pub fn create_cache_key<'a, I>(source: &TextDocument, dependencies: I) -> u32
    where
        I: IntoIterator<Item = &'a TextDocument>,
    {
        let mut key = fnv1a_32(&format!("main-{}-{}", source.uri, source.version));
        let mut seen = HashSet::new();
        for dependency in dependencies {
            if seen.insert((dependency.uri.as_str(), dependency.version)) {
                key ^= fnv1a_32(&format!("{}-{}", dependency.uri, dependency.version));
            }
        }
        key
    }

    /// Make `key` the live key of `uri`, flushing the one it replaces.
    pub fn register_cache_key(&self, key: u32, uri: &str) {
        self.cache.lock().register(key, uri.to_string());
    }

    /// Evict the view registered for `uri`. Returns whether one was registered.
    pub fn flush_cache_key(&self, uri: &str) -> bool {
        let flushed = self.cache.lock().invalidate(&uri.to_string());
        if flushed {
            tracing::debug!("Flushed merged view of {}", uri);
        }
        flushed
    }

    pub fn flush_cache(&self) {
        tracing::debug!("Flushing all merged views");
        let mut cache = self.cache.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        cache.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, key: u32) -> Option<Arc<TypeDocument>> {
        let found = self.cache.lock().get(&key);
        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.record_hit();
        } else {
            stats.record_miss();
        }
        found
    }

    /// Register `key` for `uri` and store `document` under it, unless the
    /// cache was flushed after `generation`. Returns whether it was stored.
    pub fn store(&self, generation: u64, key: u32, uri: &str, document: Arc<TypeDocument>) -> bool {
        let mut cache = self.cache.lock();
        if generation != self.generation.load(Ordering::Acquire) {
            tracing::debug!("Dropping merged view of {} built before a flush", uri);
            return false;
        }
        cache.register(key, uri.to_string());
        cache.insert(key, document);
        true
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn maybe_log_stats(&self) {
        self.stats.lock().maybe_log("merged views");
    }
}
