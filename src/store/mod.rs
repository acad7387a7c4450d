//! Remote store boundary.
//!
//! Durable storage and server-side invocation live behind [`RemoteStore`]:
//! the metric batcher calls edge functions through it and the response cache
//! reads and writes rows through it. Two implementations ship with the crate:
//!
//! - [`SupabaseStore`]: PostgREST rows and edge functions over HTTPS.
//! - [`MemoryStore`]: process-local tables with fault injection, for tests
//!   and offline runs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod memory;
mod supabase;

pub use memory::{Fault, FunctionCall, MemoryStore};
pub use supabase::SupabaseStore;

use crate::error::{FileChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of an edge-function call that reached the backend.
///
/// Transport failures are reported as `Err` by [`RemoteStore::invoke_function`];
/// a function that ran and failed shows up here with `error` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub data: Option<Value>,
    pub error: Option<String>,
    /// HTTP status of a failed invocation, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl FunctionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// A failure the backend answered with `status`
    pub fn failed_with_status(status: u16, error: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::failed(error)
        }
    }

    /// Collapse the `{data, error}` pair into a `Result`
    pub fn into_result(self) -> Result<Option<Value>> {
        match self.error {
            Some(message) => Err(FileChatError::RemoteStore {
                status: self.status.unwrap_or(500),
                message,
            }),
            None => Ok(self.data),
        }
    }
}

/// Persistence and RPC collaborator shared by the batcher and the cache
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Invoke a server-side function with a JSON payload
    async fn invoke_function(&self, name: &str, payload: Value) -> Result<FunctionResponse>;

    /// Fetch the row whose `key` column equals `key`
    async fn select_by_key(&self, table: &str, key: &str) -> Result<Option<Value>>;

    /// Insert or overwrite a row, using `key` as the conflict target
    async fn upsert(&self, table: &str, row: Value) -> Result<()>;

    /// Delete the row whose `key` column equals `key`; `true` if one existed
    async fn delete_by_key(&self, table: &str, key: &str) -> Result<bool>;

    /// Call a database function
    async fn rpc(&self, function: &str, args: Value) -> Result<Value>;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}
