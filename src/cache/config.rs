//! Cache configuration.
//!
//! Selects the tree cache provider and its limits via the `[cache]` section of `canopy.toml`.

use std::{num::NonZeroUsize, time::Duration};

use serde::Deserialize;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_MAX_ENTRIES: usize = 1024;
const DEFAULT_KEY_PREFIX: &str = "tree";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheProviderKind {
    Memory,
    Redis,
    Disabled,
}

/// Tree cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which provider backs the cache.
    pub provider: CacheProviderKind,
    /// Expiry window applied to every stored page.
    pub ttl_seconds: u64,
    /// Maximum pages held by the in-process provider.
    pub max_entries: usize,
    /// Connection URL for the redis provider.
    pub redis_url: Option<String>,
    /// Key namespace; entries live under `{prefix}:{page}:{pageSize}`.
    pub key_prefix: String,
    /// Upper bound on establishing a redis connection.
    pub connect_timeout_ms: u64,
    /// Upper bound on a single redis round trip (or a full invalidation sweep).
    pub response_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: CacheProviderKind::Memory,
            ttl_seconds: DEFAULT_TTL_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            provider: settings.provider,
            ttl_seconds: settings.ttl.as_secs(),
            max_entries: settings.max_entries.get(),
            redis_url: settings.redis_url.clone(),
            key_prefix: settings.key_prefix.clone(),
            connect_timeout_ms: settings.connect_timeout.as_millis() as u64,
            response_timeout_ms: settings.response_timeout.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}
