// In-process remote store with fault injection
// Author: kelexine (https://github.com/kelexine)

use super::{FunctionResponse, RemoteStore};
use crate::error::{FileChatError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Failure to simulate on the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call itself fails (transport error)
    Reject,
    /// The call reaches the backend, which answers with an error
    ReportError,
    /// The backend refuses the call as invalid (HTTP 400)
    Refuse,
    /// The call never completes
    Hang,
}

/// An edge-function invocation the store accepted
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct FaultPlan {
    persistent: Option<Fault>,
    queued: VecDeque<Fault>,
}

impl FaultPlan {
    fn next(&mut self) -> Option<Fault> {
        self.queued.pop_front().or(self.persistent)
    }
}

/// Process-local [`RemoteStore`].
///
/// Tables are maps from the `key` column to the whole row. Function calls
/// are recorded instead of executed. Faults can be scheduled separately for
/// function calls and for table/RPC access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, HashMap<String, Value>>>,
    calls: Mutex<Vec<FunctionCall>>,
    function_attempts: AtomicUsize,
    function_faults: Mutex<FaultPlan>,
    table_faults: Mutex<FaultPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every function call with `fault` until cleared with `None`
    pub fn fail_functions(&self, fault: Option<Fault>) {
        self.function_faults.lock().persistent = fault;
    }

    /// Fail the next `count` function calls with `fault`
    pub fn fail_next_functions(&self, fault: Fault, count: usize) {
        let mut plan = self.function_faults.lock();
        plan.queued.extend(std::iter::repeat(fault).take(count));
    }

    /// Fail every table and RPC call with `fault` until cleared with `None`
    pub fn fail_tables(&self, fault: Option<Fault>) {
        self.table_faults.lock().persistent = fault;
    }

    /// Successful function calls, in the order they were accepted
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.calls.lock().clone()
    }

    /// Number of function calls attempted, failed ones included
    pub fn function_attempts(&self) -> usize {
        self.function_attempts.load(Ordering::SeqCst)
    }

    pub fn row(&self, table: &str, key: &str) -> Option<Value> {
        self.tables.lock().get(table)?.get(key).cloned()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, HashMap::len)
    }

    /// Write a row directly, bypassing fault injection
    pub fn insert_row(&self, table: &str, row: Value) -> Result<()> {
        let key = Self::row_key(&row)?;
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(key, row);
        Ok(())
    }

    fn row_key(row: &Value) -> Result<String> {
        row.get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FileChatError::InvalidRecord("row has no string `key` column".into()))
    }

    async fn apply(fault: Option<Fault>) -> Result<()> {
        match fault {
            None | Some(Fault::ReportError) => Ok(()),
            Some(Fault::Reject) => Err(FileChatError::RemoteStore {
                status: 503,
                message: "injected rejection".into(),
            }),
            Some(Fault::Refuse) => Err(FileChatError::RemoteStore {
                status: 400,
                message: "injected refusal".into(),
            }),
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn table_access(&self) -> Result<()> {
        let fault = self.table_faults.lock().next();
        if fault == Some(Fault::ReportError) {
            return Err(FileChatError::RemoteStore {
                status: 500,
                message: "injected table error".into(),
            });
        }
        Self::apply(fault).await
    }

    fn is_expired(row: &Value, now: DateTime<Utc>) -> bool {
        row.get("expires_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or(false, |at| at.with_timezone(&Utc) <= now)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn invoke_function(&self, name: &str, payload: Value) -> Result<FunctionResponse> {
        self.function_attempts.fetch_add(1, Ordering::SeqCst);
        let fault = self.function_faults.lock().next();
        Self::apply(fault).await?;

        if fault == Some(Fault::ReportError) {
            return Ok(FunctionResponse::failed("injected function error"));
        }

        debug!("MemoryStore accepted call to {}", name);
        self.calls.lock().push(FunctionCall {
            name: name.to_string(),
            payload,
        });
        Ok(FunctionResponse::ok(json!({ "success": true })))
    }

    async fn select_by_key(&self, table: &str, key: &str) -> Result<Option<Value>> {
        self.table_access().await?;
        Ok(self.row(table, key))
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<()> {
        self.table_access().await?;
        self.insert_row(table, row)
    }

    async fn delete_by_key(&self, table: &str, key: &str) -> Result<bool> {
        self.table_access().await?;
        Ok(self
            .tables
            .lock()
            .get_mut(table)
            .and_then(|rows| rows.remove(key))
            .is_some())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        self.table_access().await?;
        match function {
            "cleanup_expired_cache" => {
                let now = Utc::now();
                let mut removed = 0;
                for rows in self.tables.lock().values_mut() {
                    let before = rows.len();
                    rows.retain(|_, row| !Self::is_expired(row, now));
                    removed += before - rows.len();
                }
                Ok(json!(removed))
            }
            "increment_cache_access_count" => {
                let key = args.get("cache_key").and_then(Value::as_str).unwrap_or_default();
                for rows in self.tables.lock().values_mut() {
                    if let Some(row) = rows.get_mut(key) {
                        let count = row.get("access_count").and_then(Value::as_u64).unwrap_or(0);
                        row["access_count"] = json!(count + 1);
                    }
                }
                Ok(Value::Null)
            }
            other => Err(FileChatError::RemoteStore {
                status: 404,
                message: format!("function {} does not exist", other),
            }),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_by_key() {
        let store = MemoryStore::new();
        store.upsert("t", json!({"key": "a", "v": 1})).await.unwrap();
        store.upsert("t", json!({"key": "a", "v": 2})).await.unwrap();

        assert_eq!(store.row_count("t"), 1);
        assert_eq!(store.select_by_key("t", "a").await.unwrap().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_upsert_requires_key() {
        let store = MemoryStore::new();
        let err = store.upsert("t", json!({"v": 1})).await.unwrap_err();
        assert!(matches!(err, FileChatError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_queued_faults_run_out() {
        let store = MemoryStore::new();
        store.fail_next_functions(Fault::Reject, 1);
        store.fail_next_functions(Fault::ReportError, 1);

        assert!(store.invoke_function("f", json!({})).await.is_err());
        let reported = store.invoke_function("f", json!({})).await.unwrap();
        assert!(reported.error.is_some());
        let ok = store.invoke_function("f", json!({"n": 1})).await.unwrap();
        assert!(ok.error.is_none());

        assert_eq!(store.function_attempts(), 3);
        assert_eq!(store.function_calls().len(), 1);
        assert_eq!(store.function_calls()[0].payload, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_cleanup_rpc_removes_expired_rows() {
        let store = MemoryStore::new();
        store
            .insert_row("c", json!({"key": "old", "expires_at": "2000-01-01T00:00:00Z"}))
            .unwrap();
        store
            .insert_row("c", json!({"key": "new", "expires_at": "2999-01-01T00:00:00Z"}))
            .unwrap();

        let removed = store.rpc("cleanup_expired_cache", json!({})).await.unwrap();
        assert_eq!(removed, json!(1));
        assert!(store.row("c", "old").is_none());
        assert!(store.row("c", "new").is_some());
    }

    #[tokio::test]
    async fn test_unknown_rpc_is_an_error() {
        let store = MemoryStore::new();
        assert!(store.rpc("nope", json!({})).await.is_err());
    }
}
