// Response cache - two-tier lookup of previously computed AI responses
// Author: kelexine (https://github.com/kelexine)

use crate::cache::key::{key_for_value, metadata_value};
use crate::cache::models::{CacheStats, CachedResponse};
use crate::config::ResponseCacheConfig;
use crate::error::{FileChatError, Result};
use crate::metrics::record_cache_operation;
use crate::store::RemoteStore;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, warn};

/// Cache of AI responses keyed by (prompt, provider, metadata).
///
/// Reads go to an in-process LRU first and then to the cache table; remote
/// hits are copied into the LRU. Expired entries are treated as absent in both
/// tiers. Every failure is logged and absorbed: lookups degrade to a miss and
/// stores are skipped, so callers always fall through to recomputation.
pub struct ResponseCache {
    store: Arc<dyn RemoteStore>,
    config: ResponseCacheConfig,
    local: Option<Mutex<LruCache<String, CachedResponse>>>,
    stats: Mutex<CacheStats>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn RemoteStore>, config: ResponseCacheConfig) -> Self {
        let local = NonZeroUsize::new(config.local_capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            store,
            config,
            local,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Look up a previously stored response.
    ///
    /// Returns `None` when nothing is stored, when the entry has expired, and
    /// when the lookup fails for any reason.
    pub async fn get_cached_response<M: Serialize + ?Sized>(
        &self,
        prompt: &str,
        provider: &str,
        user_id: &str,
        metadata: &M,
    ) -> Option<CachedResponse> {
        if !self.config.enabled {
            debug!("Response cache disabled");
            return None;
        }

        let key = match metadata_value(metadata).and_then(|m| key_for_value(prompt, provider, &m)) {
            Ok(key) => key,
            Err(e) => {
                error!(user_id, provider, "Cannot derive cache key: {}", e);
                self.record(|s| s.errors += 1, "error");
                return None;
            }
        };

        match self.lookup(&key).await {
            Ok(Some(entry)) => {
                debug!(user_id, "Cache hit: {}", &key[..16]);
                Some(entry)
            }
            Ok(None) => {
                debug!(user_id, "Cache miss: {}", &key[..16]);
                self.record(|s| s.misses += 1, "miss");
                None
            }
            Err(e) => {
                warn!(user_id, "Cache lookup failed for {}: {}", &key[..16], e);
                self.record(
                    |s| {
                        s.errors += 1;
                        s.misses += 1;
                    },
                    "error",
                );
                None
            }
        }
    }

    /// Store a computed response, overwriting any entry with the same key.
    ///
    /// Best-effort: failures are logged and never reach the caller.
    #[allow(clippy::too_many_arguments)]
    pub async fn set_cached_response<M: Serialize + ?Sized>(
        &self,
        prompt: &str,
        response: &str,
        provider: &str,
        tokens_used: u64,
        estimated_cost: f64,
        user_id: &str,
        metadata: &M,
    ) {
        if !self.config.enabled {
            return;
        }

        let entry = match self.build_entry(prompt, response, provider, tokens_used, estimated_cost, user_id, metadata) {
            Ok(entry) => entry,
            Err(e) => {
                error!(user_id, provider, "Refusing to cache response: {}", e);
                self.record(|s| s.errors += 1, "error");
                return;
            }
        };

        self.local_put(entry.clone());

        let row = match serde_json::to_value(&entry) {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to serialize cache entry: {}", e);
                self.record(|s| s.errors += 1, "error");
                return;
            }
        };

        match self
            .with_timeout(self.store.upsert(&self.config.table, row))
            .await
        {
            Ok(()) => {
                debug!(user_id, "Cached response under {}", &entry.key[..16]);
                self.record(|s| s.stores += 1, "store");
            }
            Err(e) => {
                warn!(user_id, "Failed to store cache entry {}: {}", &entry.key[..16], e);
                self.record(|s| s.errors += 1, "error");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_entry<M: Serialize + ?Sized>(
        &self,
        prompt: &str,
        response: &str,
        provider: &str,
        tokens_used: u64,
        estimated_cost: f64,
        user_id: &str,
        metadata: &M,
    ) -> Result<CachedResponse> {
        if !estimated_cost.is_finite() || estimated_cost < 0.0 {
            return Err(FileChatError::InvalidRecord(format!(
                "estimated_cost must be a non-negative number, got {}",
                estimated_cost
            )));
        }

        let metadata = metadata_value(metadata)?;
        let key = key_for_value(prompt, provider, &metadata)?;
        let ttl = chrono::Duration::from_std(self.config.ttl())
            .map_err(|e| FileChatError::Config(format!("cache.ttl_seconds out of range: {}", e)))?;
        let expiration_date = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            FileChatError::Config(format!(
                "cache.ttl_seconds ({}) puts the expiration date out of range",
                self.config.ttl_seconds
            ))
        })?;

        Ok(CachedResponse {
            key,
            prompt: prompt.to_string(),
            response: response.to_string(),
            provider: provider.to_string(),
            tokens_used,
            estimated_cost,
            user_id: user_id.to_string(),
            metadata,
            expiration_date,
            access_count: 1,
        })
    }

    async fn lookup(&self, key: &str) -> Result<Option<CachedResponse>> {
        let now = Utc::now();

        if let Some(entry) = self.local_get(key, now) {
            self.record(
                |s| {
                    s.hits += 1;
                    s.local_hits += 1;
                },
                "local_hit",
            );
            return Ok(Some(entry));
        }

        let row = self
            .with_timeout(self.store.select_by_key(&self.config.table, key))
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let entry: CachedResponse = serde_json::from_value(row)
            .map_err(|e| FileChatError::InvalidRecord(format!("unreadable cache row: {}", e)))?;

        if entry.is_expired_at(now) {
            debug!("Cache entry {} expired at {}", &key[..16], entry.expiration_date);
            self.record(|s| s.expired += 1, "expired");
            if self.config.evict_expired_on_read {
                self.evict_remote(key).await;
            }
            return Ok(None);
        }

        self.local_put(entry.clone());
        self.record(|s| s.hits += 1, "hit");
        Ok(Some(entry))
    }

    async fn evict_remote(&self, key: &str) {
        match self
            .with_timeout(self.store.delete_by_key(&self.config.table, key))
            .await
        {
            Ok(removed) => debug!("Evicted expired entry {} (removed: {})", &key[..16], removed),
            Err(e) => debug!("Could not evict expired entry {}: {}", &key[..16], e),
        }
    }

    fn local_get(&self, key: &str, now: DateTime<Utc>) -> Option<CachedResponse> {
        let mut local = self.local.as_ref()?.lock();
        let expired = local.get(key)?.is_expired_at(now);
        if expired {
            local.pop(key);
            drop(local);
            self.record(|s| s.expired += 1, "expired");
            return None;
        }
        local.get(key).cloned()
    }

    fn local_put(&self, entry: CachedResponse) {
        if let Some(local) = &self.local {
            local.lock().put(entry.key.clone(), entry);
        }
    }

    /// Drop expired entries from the in-process tier; returns how many went
    pub fn purge_local_expired(&self) -> usize {
        let Some(local) = &self.local else {
            return 0;
        };
        let now = Utc::now();
        let mut local = local.lock();
        let expired: Vec<String> = local
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            local.pop(key);
        }
        expired.len()
    }

    /// Ask the backend to delete expired rows; `None` if the sweep failed
    pub async fn purge_remote_expired(&self) -> Option<u64> {
        match self
            .with_timeout(self.store.rpc("cleanup_expired_cache", json!({})))
            .await
        {
            Ok(removed) => {
                let removed = removed.as_u64().unwrap_or(0);
                debug!("Remote cache sweep removed {} rows", removed);
                Some(removed)
            }
            Err(e) => {
                warn!("Remote cache sweep failed: {}", e);
                self.record(|s| s.errors += 1, "error");
                None
            }
        }
    }

    /// Clear the in-process tier
    pub fn clear_local(&self) {
        if let Some(local) = &self.local {
            local.lock().clear();
            debug!("Local response cache cleared");
        }
    }

    pub fn local_len(&self) -> usize {
        self.local.as_ref().map_or(0, |local| local.lock().len())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats), operation: &str) {
        update(&mut self.stats.lock());
        record_cache_operation(operation);
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.rpc_timeout();
        time::timeout(timeout, call)
            .await
            .map_err(|_| FileChatError::Timeout(timeout))?
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("store", &self.store.name())
            .field("table", &self.config.table)
            .field("local_len", &self.local_len())
            .finish()
    }
}
