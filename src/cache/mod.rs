//! Canopy tree cache
//!
//! Memoizes rendered tree pages per exact `(page, pageSize)` key with a TTL.
//! Any successful mutation of the node store discards every page, because a
//! single insert or delete shifts row membership across all later pages.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! provider = "memory"   # memory | redis | disabled
//! ttl_seconds = 300
//! key_prefix = "tree"
//! ```

mod config;
mod lock;
mod memory;
mod provider;
mod redis_cache;

pub use config::{CacheConfig, CacheProviderKind};
pub use memory::MemoryTreeCache;
pub use provider::{CacheError, DisabledTreeCache, PageKey, TreeCacheProvider};
pub use redis_cache::RedisTreeCache;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::counter;
use tracing::info;

use crate::application::pagination::{PageRequest, PaginatedTree};

use lock::{rw_read, rw_write};

pub const METRIC_TREE_CACHE_HIT: &str = "canopy_tree_cache_hit_total";
pub const METRIC_TREE_CACHE_MISS: &str = "canopy_tree_cache_miss_total";
pub const METRIC_TREE_CACHE_INVALIDATE: &str = "canopy_tree_cache_invalidate_total";
pub const METRIC_TREE_CACHE_DEGRADED: &str = "canopy_tree_cache_degraded_total";

const SOURCE: &str = "cache::handle";

/// Build the provider selected by `config`.
pub fn provider_from_config(
    config: &CacheConfig,
) -> Result<Arc<dyn TreeCacheProvider>, CacheError> {
    let provider: Arc<dyn TreeCacheProvider> = match config.provider {
        CacheProviderKind::Memory => Arc::new(MemoryTreeCache::new(config)),
        CacheProviderKind::Redis => Arc::new(RedisTreeCache::new(config)?),
        CacheProviderKind::Disabled => Arc::new(DisabledTreeCache),
    };
    Ok(provider)
}

/// Shared handle to the active provider.
///
/// The provider is swapped as a unit. Calls clone the current `Arc` and
/// release the lock before awaiting, so no lock is held across I/O.
#[derive(Clone)]
pub struct TreeCache {
    provider: Arc<RwLock<Arc<dyn TreeCacheProvider>>>,
}

impl TreeCache {
    pub fn new(provider: Arc<dyn TreeCacheProvider>) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
        }
    }

    fn current(&self) -> Arc<dyn TreeCacheProvider> {
        rw_read(&self.provider, SOURCE, "current").clone()
    }

    pub fn provider_name(&self) -> &'static str {
        self.current().name()
    }

    pub async fn get(&self, request: PageRequest) -> Option<PaginatedTree> {
        let provider = self.current();
        let found = provider.get(PageKey::from(request)).await;
        if found.is_some() {
            counter!(METRIC_TREE_CACHE_HIT, "provider" => provider.name()).increment(1);
        } else {
            counter!(METRIC_TREE_CACHE_MISS, "provider" => provider.name()).increment(1);
        }
        found
    }

    pub async fn put(&self, request: PageRequest, value: &PaginatedTree) {
        self.current().put(PageKey::from(request), value).await;
    }

    pub async fn invalidate_all(&self) {
        let provider = self.current();
        provider.invalidate_all().await;
        counter!(METRIC_TREE_CACHE_INVALIDATE, "provider" => provider.name()).increment(1);
    }

    /// Change the expiry window of the active provider.
    pub async fn set_ttl(&self, ttl: Duration) {
        self.current().set_ttl(ttl).await;
    }

    /// Initialize `provider` and make it the active one. On failure the
    /// previous provider stays in place.
    pub async fn replace_provider(
        &self,
        provider: Arc<dyn TreeCacheProvider>,
    ) -> Result<(), CacheError> {
        provider.initialize().await?;
        let name = provider.name();
        let previous = std::mem::replace(
            &mut *rw_write(&self.provider, SOURCE, "replace_provider"),
            provider,
        );
        info!(
            target = "canopy::cache",
            from = previous.name(),
            to = name,
            "tree cache provider replaced"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PaginatedTree {
        PaginatedTree::empty(PageRequest::default(), 0)
    }

    #[tokio::test]
    async fn replace_provider_swaps_whole_state() {
        let cache = TreeCache::new(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))));
        cache.put(PageRequest::default(), &page()).await;
        assert!(cache.get(PageRequest::default()).await.is_some());

        cache
            .replace_provider(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))))
            .await
            .expect("memory provider initializes");

        assert_eq!(cache.provider_name(), "memory");
        assert!(cache.get(PageRequest::default()).await.is_none());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_previous_provider() {
        let cache = TreeCache::new(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))));
        cache.put(PageRequest::default(), &page()).await;

        let unreachable = RedisTreeCache::new(&CacheConfig {
            redis_url: Some("redis://127.0.0.1:1/".to_string()),
            connect_timeout_ms: 200,
            ..Default::default()
        })
        .expect("client");

        assert!(cache.replace_provider(Arc::new(unreachable)).await.is_err());
        assert_eq!(cache.provider_name(), "memory");
        assert!(cache.get(PageRequest::default()).await.is_some());
    }

    #[tokio::test]
    async fn ttl_change_reaches_the_active_provider() {
        let cache = TreeCache::new(Arc::new(MemoryTreeCache::with_ttl(Duration::from_secs(60))));
        cache.set_ttl(Duration::ZERO).await;

        cache.put(PageRequest::default(), &page()).await;
        assert!(cache.get(PageRequest::default()).await.is_none());

        cache.set_ttl(Duration::from_secs(60)).await;
        cache.put(PageRequest::default(), &page()).await;
        assert!(cache.get(PageRequest::default()).await.is_some());
    }

    #[test]
    fn provider_selection_follows_config() {
        let memory = provider_from_config(&CacheConfig::default()).expect("memory");
        assert_eq!(memory.name(), "memory");

        let disabled = provider_from_config(&CacheConfig {
            provider: CacheProviderKind::Disabled,
            ..Default::default()
        })
        .expect("disabled");
        assert_eq!(disabled.name(), "disabled");

        let redis = provider_from_config(&CacheConfig {
            provider: CacheProviderKind::Redis,
            ..Default::default()
        });
        assert!(matches!(redis, Err(CacheError::Configuration(_))));
    }
}
