use lru::LruCache;
use std::sync::{Arc, Mutex};

use crate::actor::lock;
use crate::plugins::FetchedTile;

/// Worker-side cache of fetched tile responses, keyed by request URL.
///
/// The cache itself is unbounded; the front periodically asks the worker to
/// trim it with [`TileRequestCache::enforce_size_limit`].
#[derive(Clone)]
pub struct TileRequestCache {
    cache: Arc<Mutex<LruCache<String, FetchedTile>>>,
}

impl TileRequestCache {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(Mutex::new(LruCache::unbounded())),
        }
    }

    /// Get a response, marking it recently used
    pub fn get(&self, url: &str) -> Option<FetchedTile> {
        lock(&self.cache).get(url).cloned()
    }

    pub fn put(&self, url: String, tile: FetchedTile) {
        lock(&self.cache).put(url, tile);
    }

    pub fn contains(&self, url: &str) -> bool {
        lock(&self.cache).contains(url)
    }

    pub fn remove(&self, url: &str) -> Option<FetchedTile> {
        lock(&self.cache).pop(url)
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict least recently used entries until at most `limit` remain.
    /// Returns how many were evicted.
    pub fn enforce_size_limit(&self, limit: usize) -> usize {
        let mut cache = lock(&self.cache);
        let mut evicted = 0;
        while cache.len() > limit {
            if cache.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            log::debug!("request cache trimmed by {} entries to {}", evicted, cache.len());
        }
        evicted
    }
}

impl Default for TileRequestCache {
    fn default() -> Self {
        Self::new()
    }
}
