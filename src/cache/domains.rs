//! Domain-routing cache: request host to content root.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;

use crate::domain::entities::DomainRoute;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::domains";

pub struct DomainCache {
    routes: RwLock<LruCache<String, DomainRoute>>,
    generation: AtomicU64,
}

impl DomainCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            routes: RwLock::new(LruCache::new(config.domain_limit_non_zero())),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve `host`, loading and caching the route on a miss.
    pub fn get_or_insert_with<F>(&self, host: &str, load: F) -> Option<DomainRoute>
    where
        F: FnOnce() -> Option<DomainRoute>,
    {
        let host = host.to_ascii_lowercase();
        if let Some(route) = rw_write(&self.routes, SOURCE, "get").get(&host).cloned() {
            return Some(route);
        }

        let route = load()?;
        rw_write(&self.routes, SOURCE, "insert").put(host, route.clone());
        Some(route)
    }

    pub fn get(&self, host: &str) -> Option<DomainRoute> {
        rw_write(&self.routes, SOURCE, "get")
            .get(&host.to_ascii_lowercase())
            .cloned()
    }

    /// Drop every route on this node and bump the clear generation.
    pub fn clear(&self) {
        rw_write(&self.routes, SOURCE, "clear").clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of clears since startup.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.routes, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
