//! Configuration data structures for filechat.
//!
//! This module defines the schema for the application settings: the Supabase
//! connection, the performance-metric batcher, the response cache and logging.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The root configuration object for the application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Supabase project connection settings.
    #[serde(default)]
    pub supabase: SupabaseConfig,

    /// Performance-metric batching settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// AI response cache settings.
    #[serde(default)]
    pub cache: ResponseCacheConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the Supabase backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    /// Default: `http://127.0.0.1:54321` (local Supabase CLI stack)
    #[serde(default = "default_supabase_url")]
    pub url: String,

    /// API key sent as both `apikey` and bearer token.
    /// Default: empty
    #[serde(default)]
    pub api_key: String,

    /// HTTP client timeout in seconds.
    /// Default: `30`
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: u64,
}

/// Settings for the performance-metric batcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Pending count that triggers an immediate flush.
    /// Default: `10`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Period of the background flush timer in seconds.
    /// Default: `600` (10 minutes)
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,

    /// Upper bound on metrics held in memory, including requeued ones.
    /// Default: `1000`
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Timeout applied to each ingestion call in seconds.
    /// Default: `10`
    #[serde(default = "default_metrics_rpc_timeout")]
    pub rpc_timeout_seconds: u64,

    /// First backoff delay after a failed flush, in milliseconds.
    /// Default: `1000`
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Ceiling for the backoff delay in seconds.
    /// Default: `300`
    #[serde(default = "default_backoff_max")]
    pub backoff_max_seconds: u64,

    /// Edge function receiving metric batches.
    /// Default: `log-performance-metrics`
    #[serde(default = "default_metrics_function")]
    pub function_name: String,
}

/// Settings for the AI response cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// Whether lookups and stores are performed at all.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Table holding cached responses.
    /// Default: `embeddings_cache`
    #[serde(default = "default_cache_table")]
    pub table: String,

    /// Lifetime of a stored response in seconds.
    /// Default: `604800` (7 days)
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    /// Capacity of the in-process LRU tier. `0` disables it.
    /// Default: `256`
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// Timeout applied to each remote cache call in seconds.
    /// Default: `5`
    #[serde(default = "default_cache_rpc_timeout")]
    pub rpc_timeout_seconds: u64,

    /// Delete expired rows from the remote table when a read finds them.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub evict_expired_on_read: bool,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to mask API keys and JWTs in logged remote errors.
    /// Default: `true`
    #[serde(default = "default_true")]
    pub sanitize_tokens: bool,
}

impl MetricsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }
}

impl ResponseCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }
}

// Default trait implementations linking to custom logic

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: default_supabase_url(),
            api_key: String::new(),
            timeout_seconds: default_http_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_seconds: default_flush_interval(),
            max_pending: default_max_pending(),
            rpc_timeout_seconds: default_metrics_rpc_timeout(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_seconds: default_backoff_max(),
            function_name: default_metrics_function(),
        }
    }
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: default_cache_table(),
            ttl_seconds: default_cache_ttl(),
            local_capacity: default_local_capacity(),
            rpc_timeout_seconds: default_cache_rpc_timeout(),
            evict_expired_on_read: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            sanitize_tokens: true,
        }
    }
}

// Helper functions for serde defaults and shared constants
fn default_supabase_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval() -> u64 {
    600 // 10 minutes
}

fn default_max_pending() -> usize {
    1000
}

fn default_metrics_rpc_timeout() -> u64 {
    10
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    300
}

fn default_metrics_function() -> String {
    "log-performance-metrics".to_string()
}

fn default_cache_table() -> String {
    "embeddings_cache".to_string()
}

fn default_cache_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_local_capacity() -> usize {
    256
}

fn default_cache_rpc_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
