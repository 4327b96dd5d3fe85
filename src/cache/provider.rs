//! Provider abstraction for the paginated tree cache.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::{PageRequest, PaginatedTree};

/// Exact `(page, pageSize)` key. Different page sizes never share entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page: u32,
    pub page_size: u32,
}

impl PageKey {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Namespaced key for external stores: `{prefix}:{page}:{pageSize}`.
    pub fn namespaced(&self, prefix: &str) -> String {
        format!("{prefix}:{self}")
    }
}

impl From<PageRequest> for PageKey {
    fn from(request: PageRequest) -> Self {
        Self::new(request.page(), request.page_size())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.page_size)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unreachable: {0}")]
    Unavailable(String),
    #[error("cache backend did not respond within {0:?}")]
    Timeout(Duration),
    #[error("cache misconfigured: {0}")]
    Configuration(String),
}

/// A store of rendered tree pages.
///
/// Lookups and writes never fail: an unavailable backend reports a miss and
/// drops writes. Only `initialize` surfaces errors so callers can decide
/// whether to start degraded.
#[async_trait]
pub trait TreeCacheProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self) -> Result<(), CacheError>;

    /// `None` when absent or expired.
    async fn get(&self, key: PageKey) -> Option<PaginatedTree>;

    /// Store or overwrite; the entry expires `ttl` from now.
    async fn put(&self, key: PageKey, value: &PaginatedTree);

    /// Remove every entry for every key.
    async fn invalidate_all(&self);

    /// Change the expiry window used by subsequent `put` calls.
    async fn set_ttl(&self, ttl: Duration);
}

/// Provider that stores nothing; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTreeCache;

#[async_trait]
impl TreeCacheProvider for DisabledTreeCache {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn initialize(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn get(&self, _key: PageKey) -> Option<PaginatedTree> {
        None
    }

    async fn put(&self, _key: PageKey, _value: &PaginatedTree) {}

    async fn invalidate_all(&self) {}

    async fn set_ttl(&self, _ttl: Duration) {}
}
