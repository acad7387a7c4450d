//! Composition root.
//!
//! [`FileChat`] owns the one remote store, metric batcher and response cache
//! of a process and wires the cache-or-compute path used by chat requests.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::error::Result;
use crate::metrics::{FlushOutcome, MetricBatcher, PerformanceMetric};
use crate::store::{RemoteStore, SupabaseStore};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Operation name recorded for AI completions
pub const COMPLETION_OPERATION: &str = "ai.completion";

/// A response as returned to the chat path.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response: String,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    /// Whether the response came from the cache
    pub cached: bool,
}

impl Completion {
    /// A freshly computed response
    pub fn computed(response: impl Into<String>, tokens_used: u64, estimated_cost: f64) -> Self {
        Self {
            response: response.into(),
            tokens_used,
            estimated_cost,
            cached: false,
        }
    }
}

/// Process-wide services, constructed once and shared by handle.
pub struct FileChat {
    store: Arc<dyn RemoteStore>,
    batcher: MetricBatcher,
    cache: ResponseCache,
}

impl FileChat {
    /// Build the Supabase store from `config` and wire everything around it.
    ///
    /// Must be called from within a Tokio runtime (starts the flush timer).
    pub fn connect(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let store = SupabaseStore::new(&config.supabase, config.logging.sanitize_tokens)?;
        info!("Using Supabase backend at {}", store.base_url());
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Wire the batcher and cache around an existing store
    pub fn with_store(store: Arc<dyn RemoteStore>, config: &AppConfig) -> Self {
        let batcher = MetricBatcher::start(store.clone(), config.metrics.clone());
        let cache = ResponseCache::new(store.clone(), config.cache.clone());
        Self {
            store,
            batcher,
            cache,
        }
    }

    pub fn batcher(&self) -> &MetricBatcher {
        &self.batcher
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// Answer from the cache, or run `compute` and cache its result.
    ///
    /// Either way one `ai.completion` sample is recorded with `cacheHit` set.
    /// Errors from `compute` are returned untouched; cache and metric
    /// failures never are.
    pub async fn complete_cached<M, F, Fut, E>(
        &self,
        prompt: &str,
        provider: &str,
        user_id: &str,
        metadata: &M,
        compute: F,
    ) -> std::result::Result<Completion, E>
    where
        M: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Completion, E>>,
        E: std::fmt::Display,
    {
        let started = Instant::now();

        if let Some(hit) = self
            .cache
            .get_cached_response(prompt, provider, user_id, metadata)
            .await
        {
            self.batcher.record_metric(
                PerformanceMetric::succeeded(COMPLETION_OPERATION, started.elapsed())
                    .with_cache_hit(true),
            );
            return Ok(Completion {
                response: hit.response,
                tokens_used: hit.tokens_used,
                estimated_cost: hit.estimated_cost,
                cached: true,
            });
        }

        match compute().await {
            Ok(completion) => {
                self.cache
                    .set_cached_response(
                        prompt,
                        &completion.response,
                        provider,
                        completion.tokens_used,
                        completion.estimated_cost,
                        user_id,
                        metadata,
                    )
                    .await;
                self.batcher.record_metric(
                    PerformanceMetric::succeeded(COMPLETION_OPERATION, started.elapsed())
                        .with_cache_hit(false),
                );
                Ok(Completion {
                    cached: false,
                    ..completion
                })
            }
            Err(e) => {
                self.batcher.record_metric(
                    PerformanceMetric::failed(COMPLETION_OPERATION, started.elapsed(), e.to_string())
                        .with_cache_hit(false),
                );
                Err(e)
            }
        }
    }

    /// Flush pending metrics, then stop the batcher.
    ///
    /// A flush already in flight (e.g. from the timer) is waited out first,
    /// so nothing it drained is cut off by the teardown.
    pub async fn shutdown(&self) -> FlushOutcome {
        let outcome = self.batcher.flush_settled().await;
        self.batcher.destroy();
        info!("FileChat services stopped (final flush: {:?})", outcome);
        outcome
    }
}
