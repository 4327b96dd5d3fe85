//! Tree cache shared across processes through redis.
//!
//! Pages are stored as JSON under `{prefix}:{page}:{pageSize}` with a
//! millisecond expiry. Every failure is absorbed: reads miss, writes are
//! dropped, and the degraded counter is bumped.

use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use redis::{Client, RedisResult, aio::ConnectionManager};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::pagination::PaginatedTree;

use super::METRIC_TREE_CACHE_DEGRADED;
use super::config::CacheConfig;
use super::lock::rw_write;
use super::provider::{CacheError, PageKey, TreeCacheProvider};

const SOURCE: &str = "cache::redis";
const SCAN_BATCH: u32 = 200;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ConnectionSlot {
    manager: Option<ConnectionManager>,
    retry_after: Option<Instant>,
    connecting: bool,
}

impl ConnectionSlot {
    fn back_off(&mut self) {
        self.manager = None;
        self.retry_after = Some(Instant::now() + RECONNECT_BACKOFF);
    }
}

/// Marks a connection attempt in flight; clears the mark even if the
/// attempting future is dropped.
struct ConnectAttempt<'a> {
    slot: &'a RwLock<ConnectionSlot>,
    settled: bool,
}

impl ConnectAttempt<'_> {
    fn settle(mut self, manager: Option<&ConnectionManager>) {
        let mut slot = rw_write(self.slot, SOURCE, "connect");
        slot.connecting = false;
        match manager {
            Some(manager) => {
                slot.manager = Some(manager.clone());
                slot.retry_after = None;
            }
            None => slot.back_off(),
        }
        self.settled = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            rw_write(self.slot, SOURCE, "connect").connecting = false;
        }
    }
}

pub struct RedisTreeCache {
    client: Client,
    key_prefix: String,
    ttl_ms: AtomicU64,
    connect_timeout: Duration,
    response_timeout: Duration,
    slot: RwLock<ConnectionSlot>,
}

impl RedisTreeCache {
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let url = config
            .redis_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| CacheError::Configuration("cache.redis_url is not set".to_string()))?;
        let client = Client::open(url)
            .map_err(|err| CacheError::Configuration(format!("invalid redis url: {err}")))?;

        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
            ttl_ms: AtomicU64::new(duration_ms(config.ttl())),
            connect_timeout: config.connect_timeout(),
            response_timeout: config.response_timeout(),
            slot: RwLock::new(ConnectionSlot::default()),
        })
    }

    // Connects lazily with at most one attempt in flight. Callers arriving
    // during an attempt or inside the backoff window miss immediately, so an
    // outage costs one timeout rather than one per request.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let attempt = {
            let mut slot = rw_write(&self.slot, SOURCE, "connection");
            if let Some(manager) = slot.manager.as_ref() {
                return Ok(manager.clone());
            }
            if slot.connecting {
                return Err(CacheError::Unavailable(
                    "redis connection attempt in progress".to_string(),
                ));
            }
            if let Some(retry_after) = slot.retry_after
                && Instant::now() < retry_after
            {
                return Err(CacheError::Unavailable(
                    "waiting before reconnecting to redis".to_string(),
                ));
            }
            slot.connecting = true;
            ConnectAttempt {
                slot: &self.slot,
                settled: false,
            }
        };

        let outcome = tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await;

        match outcome {
            Ok(Ok(manager)) => {
                attempt.settle(Some(&manager));
                debug!(target = "canopy::cache::redis", "redis connection established");
                Ok(manager)
            }
            Ok(Err(err)) => {
                attempt.settle(None);
                Err(CacheError::Unavailable(err.to_string()))
            }
            Err(_) => {
                attempt.settle(None);
                Err(CacheError::Timeout(self.connect_timeout))
            }
        }
    }

    /// Runs one exchange with the server under the response deadline. A
    /// server that stops answering is disconnected and backed off.
    async fn exchange<T>(
        &self,
        request: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.response_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(CacheError::Unavailable(err.to_string())),
            Err(_) => {
                rw_write(&self.slot, SOURCE, "exchange").back_off();
                Err(CacheError::Timeout(self.response_timeout))
            }
        }
    }

    fn degraded(&self, op: &'static str, error: &dyn std::fmt::Display) {
        warn!(
            target = "canopy::cache::redis",
            op,
            error = %error,
            "tree cache degraded; continuing without it"
        );
        counter!(METRIC_TREE_CACHE_DEGRADED, "provider" => "redis", "op" => op).increment(1);
    }

    async fn scan_and_delete(&self, conn: &mut ConnectionManager) -> RedisResult<u64> {
        let pattern = format!("{}:*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await?;
            if !keys.is_empty() {
                let deleted: u64 = redis::cmd("DEL").arg(keys).query_async(conn).await?;
                removed += deleted;
            }
            if next == 0 {
                return Ok(removed);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl TreeCacheProvider for RedisTreeCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn initialize(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = self
            .exchange(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn get(&self, key: PageKey) -> Option<PaginatedTree> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                self.degraded("get", &err);
                return None;
            }
        };

        let mut lookup = redis::cmd("GET");
        lookup.arg(key.namespaced(&self.key_prefix));
        let raw: Option<String> = match self.exchange(lookup.query_async(&mut conn)).await {
            Ok(raw) => raw,
            Err(err) => {
                self.degraded("get", &err);
                return None;
            }
        };

        match serde_json::from_str(&raw?) {
            Ok(value) => Some(value),
            Err(err) => {
                self.degraded("decode", &err);
                None
            }
        }
    }

    async fn put(&self, key: PageKey, value: &PaginatedTree) {
        let ttl_ms = self.ttl_ms.load(Ordering::Relaxed);
        if ttl_ms == 0 {
            return;
        }

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                self.degraded("encode", &err);
                return;
            }
        };

        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                self.degraded("put", &err);
                return;
            }
        };

        let mut store = redis::cmd("SET");
        store
            .arg(key.namespaced(&self.key_prefix))
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms);
        let stored: Result<(), CacheError> = self.exchange(store.query_async(&mut conn)).await;
        if let Err(err) = stored {
            self.degraded("put", &err);
        }
    }

    async fn invalidate_all(&self) {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(err) => {
                self.degraded("invalidate_all", &err);
                return;
            }
        };

        match self.exchange(self.scan_and_delete(&mut conn)).await {
            Ok(removed) => debug!(
                target = "canopy::cache::redis",
                removed, "tree cache entries invalidated"
            ),
            Err(err) => self.degraded("invalidate_all", &err),
        }
    }

    // Only new writes pick up the window; stored keys keep their expiry.
    async fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(duration_ms(ttl), Ordering::Relaxed);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
