//! Bounded LRU cache from `(method, canonical path)` to a resolved route match.
//!
//! Sits beside the two tries behind its own lock (spec'd independently of the
//! trie/handler-table lock so a cache hit never contends with route
//! registration). Invalidation is a full flush: any router mutation clears
//! the whole cache rather than tracking which entries it could affect, which
//! spec.md's cache-invalidation section explicitly picks over partial
//! invalidation.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::Method;
use crate::router::RouteMatch;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method: Method,
    path: String,
}

/// Bounded LRU lookup cache. A capacity of `0` disables caching entirely —
/// `get` always misses and `put` is a no-op.
pub struct LookupCache {
    inner: Option<LruCache<CacheKey, RouteMatch>>,
}

impl LookupCache {
    /// Creates a cache with the given capacity. `0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Looks up `(method, path)`, promoting the entry to most-recently-used
    /// on a hit.
    pub fn get(&mut self, method: &Method, path: &str) -> Option<RouteMatch> {
        let cache = self.inner.as_mut()?;
        let key = CacheKey { method: method.clone(), path: path.to_string() };
        cache.get(&key).cloned()
    }

    /// Inserts a resolved match, evicting the least-recently-used entry if
    /// the cache is at capacity.
    pub fn put(&mut self, method: &Method, path: &str, route_match: RouteMatch) {
        let Some(cache) = self.inner.as_mut() else {
            return;
        };
        let key = CacheKey { method: method.clone(), path: path.to_string() };
        cache.put(key, route_match);
    }

    /// Drops every cached entry. Called by the router after any mutation.
    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
