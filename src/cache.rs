//! Memoization of computed results, owned by the application layer.
//! Entries are keyed by canonical filter key, bounded by an LRU capacity and
//! dropped wholesale whenever the dataset version changes. There is no
//! time-based expiry.
//!
//! Lookup and insert are separate calls so callers can compute a miss
//! without holding the cache lock.

use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct ResultCache<V> {
    version: u64,
    entries: LruCache<String, V>,
    hits: u64,
    misses: u64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A capacity of 0 is treated as 1
    pub fn with_capacity(capacity: usize) -> Self {
        ResultCache {
            version: 0,
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    /// Move to `version`, dropping everything cached for older data.
    /// Returns false when `version` is older than the cache's.
    fn advance(&mut self, version: u64) -> bool {
        if version > self.version {
            debug!(
                "Dataset version {} -> {}, dropping {} cached results",
                self.version,
                version,
                self.entries.len()
            );
            self.entries.clear();
            self.version = version;
        }
        version == self.version
    }

    /// Cached value for `key` computed against `version`
    pub fn get(&mut self, version: u64, key: &str) -> Option<V> {
        let hit = if self.advance(version) {
            self.entries.get(key).cloned()
        } else {
            None
        };

        match hit {
            Some(value) => {
                self.hits += 1;
                Some(value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a value computed against `version`. Values computed against a
    /// version that has since been replaced are discarded.
    pub fn insert(&mut self, version: u64, key: String, value: V) {
        if !self.advance(version) {
            debug!("Discarding result for {} computed on stale version {}", key, version);
            return;
        }
        self.entries.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
