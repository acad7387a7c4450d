// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{FileChatError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

/// Longest accepted cache entry lifetime (10 years)
pub const MAX_CACHE_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Longest accepted delay between failed metric flushes (1 day)
pub const MAX_BACKOFF_SECONDS: u64 = 24 * 60 * 60;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(&Self::default_config_path()), false)
    }

    /// Same layering as [`AppConfig::load`] with an explicit file.
    /// A missing file is an error only when `required` is set.
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path).required(required))
            // Override with environment variables (FILECHAT__CACHE__TTL_SECONDS=...)
            .add_source(
                Environment::with_prefix("FILECHAT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| FileChatError::Config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| FileChatError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the batcher and cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.metrics.batch_size == 0 {
            return Err(FileChatError::Config("metrics.batch_size must be at least 1".into()));
        }
        if self.metrics.max_pending < self.metrics.batch_size {
            return Err(FileChatError::Config(format!(
                "metrics.max_pending ({}) must not be below metrics.batch_size ({})",
                self.metrics.max_pending, self.metrics.batch_size
            )));
        }
        if self.metrics.flush_interval_seconds == 0 {
            return Err(FileChatError::Config(
                "metrics.flush_interval_seconds must be positive".into(),
            ));
        }
        if self.metrics.backoff_max_seconds > MAX_BACKOFF_SECONDS {
            return Err(FileChatError::Config(format!(
                "metrics.backoff_max_seconds must not exceed {}",
                MAX_BACKOFF_SECONDS
            )));
        }
        if self.cache.ttl_seconds > MAX_CACHE_TTL_SECONDS {
            return Err(FileChatError::Config(format!(
                "cache.ttl_seconds must not exceed {}",
                MAX_CACHE_TTL_SECONDS
            )));
        }
        if self.cache.table.trim().is_empty() {
            return Err(FileChatError::Config("cache.table must not be empty".into()));
        }
        Ok(())
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".filechat")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}
