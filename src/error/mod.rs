// Error types for filechat
// Author: kelexine (https://github.com/kelexine)

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Remote store error ({status}): {message}")]
    RemoteStore { status: u16, message: String },

    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileChatError {
    /// Whether retrying the same call later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FileChatError::Timeout(_) => true,
            FileChatError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FileChatError::RemoteStore { status, .. } => crate::utils::retry::is_retryable(*status),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FileChatError>;
