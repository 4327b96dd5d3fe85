//! In-process tree cache backed by a bounded LRU map.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;

use crate::application::pagination::PaginatedTree;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};
use super::provider::{CacheError, PageKey, TreeCacheProvider};

const SOURCE: &str = "cache::memory";

struct CacheEntry {
    value: PaginatedTree,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Pages with a per-entry expiry. Hits only take the read lock.
pub struct MemoryTreeCache {
    entries: RwLock<LruCache<PageKey, CacheEntry>>,
    ttl: RwLock<Duration>,
}

impl MemoryTreeCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.max_entries_non_zero())),
            ttl: RwLock::new(config.ttl()),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(
                CacheConfig::default().max_entries_non_zero(),
            )),
            ttl: RwLock::new(ttl),
        }
    }

    fn current_ttl(&self) -> Duration {
        *rw_read(&self.ttl, SOURCE, "current_ttl")
    }

    fn evict_if_expired(&self, key: &PageKey, now: Instant) {
        let mut entries = rw_write(&self.entries, SOURCE, "evict_if_expired");
        if entries.peek(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.pop(key);
        }
    }
}

#[async_trait]
impl TreeCacheProvider for MemoryTreeCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn initialize(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, key: PageKey) -> Option<PaginatedTree> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.peek(&key) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }
        self.evict_if_expired(&key, now);
        None
    }

    async fn put(&self, key: PageKey, value: &PaginatedTree) {
        let expires_at = Instant::now() + self.current_ttl();
        rw_write(&self.entries, SOURCE, "put").put(
            key,
            CacheEntry {
                value: value.clone(),
                expires_at,
            },
        );
    }

    async fn invalidate_all(&self) {
        rw_write(&self.entries, SOURCE, "invalidate_all").clear();
    }

    // Existing entries are re-armed with the new window as well.
    async fn set_ttl(&self, ttl: Duration) {
        *rw_write(&self.ttl, SOURCE, "set_ttl") = ttl;
        let expires_at = Instant::now() + ttl;
        let mut entries = rw_write(&self.entries, SOURCE, "set_ttl.refresh");
        for (_, entry) in entries.iter_mut() {
            entry.expires_at = expires_at;
        }
    }
}
