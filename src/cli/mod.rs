// CLI module for filechat
// Author: kelexine (https://github.com/kelexine)

use crate::error::{FileChatError, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// filechat - Inspect and exercise the response cache and metric pipeline
#[derive(Parser, Debug)]
#[command(name = "filechat", version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: ~/.filechat/config.toml)
    #[arg(long, global = true, env = "FILECHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the Prometheus exposition before exiting
    #[arg(long, global = true)]
    pub show_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the cache key for a request (offline)
    Key {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        provider: String,
        /// Request metadata as a JSON value
        #[arg(long, default_value = "{}", value_parser = parse_metadata)]
        metadata: Value,
    },
    /// Look up a cached response and print it as JSON
    Get {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "{}", value_parser = parse_metadata)]
        metadata: Value,
    },
    /// Store a response in the cache
    Put {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        response: String,
        #[arg(long)]
        provider: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 0)]
        tokens: u64,
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
        #[arg(long, default_value = "{}", value_parser = parse_metadata)]
        metadata: Value,
    },
    /// Record one performance sample and flush it
    Record {
        #[arg(long)]
        operation: String,
        #[arg(long)]
        duration_ms: u64,
        /// Mark the operation as failed
        #[arg(long)]
        failed: bool,
        #[arg(long)]
        error: Option<String>,
        #[arg(long)]
        cache_hit: Option<bool>,
    },
    /// Delete expired cache rows on the backend
    Purge,
}

/// Parse a `--metadata` argument
pub fn parse_metadata(raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| FileChatError::InvalidMetadata(format!("--metadata is not valid JSON: {}", e)))
}
