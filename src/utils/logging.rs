//! Structured logging and secret-redaction utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! Supabase credentials (JWTs and API keys) from leaking into logs when
//! remote error bodies are echoed back.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Credential prefixes and the placeholder each is replaced with.
const SECRET_PATTERNS: &[(&str, &str)] = &[
    // JWTs (anon/service-role keys, user access tokens): base64url of `{"`
    ("eyJ", "[REDACTED_JWT]"),
    ("sb_secret_", "[REDACTED_SECRET_KEY]"),
    ("sb_publishable_", "[REDACTED_PUBLISHABLE_KEY]"),
];

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Sanitizes credentials from log messages.
///
/// Every occurrence of a known credential prefix is replaced, up to the next
/// whitespace or quote, with a `\[REDACTED_*\]` placeholder.
///
/// # Arguments
///
/// * `input` - The raw string that may contain sensitive data.
///
/// # Returns
///
/// A new string where all detected secrets have been replaced.
pub fn sanitize(input: &str) -> String {
    let mut result = input.to_string();

    for (prefix, placeholder) in SECRET_PATTERNS {
        let mut from = 0;
        while let Some(offset) = result[from..].find(prefix) {
            let start = from + offset;
            let end = result[start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
                .map(|i| start + i)
                .unwrap_or(result.len());
            result.replace_range(start..end, placeholder);
            from = start + placeholder.len();
        }
    }

    result
}
