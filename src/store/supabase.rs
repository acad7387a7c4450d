// Supabase-backed remote store (PostgREST + edge functions)
// Author: kelexine (https://github.com/kelexine)

use super::{FunctionResponse, RemoteStore};
use crate::config::SupabaseConfig;
use crate::error::{FileChatError, Result};
use crate::utils::logging::sanitize;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client for a Supabase project.
///
/// Rows are addressed through PostgREST (`/rest/v1/<table>`), database
/// functions through `/rest/v1/rpc/<fn>`, and edge functions through
/// `/functions/v1/<name>`. Every request carries the project API key both as
/// `apikey` and as a bearer token.
pub struct SupabaseStore {
    http_client: Client,
    base_url: String,
    api_key: String,
    sanitize_errors: bool,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig, sanitize_errors: bool) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(FileChatError::Config("supabase.url must not be empty".into()));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .use_rustls_tls()
            .build()
            .map_err(|e| FileChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sanitize_errors,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Read the status and sanitized message of a failed response
    async fn read_error(&self, response: Response) -> (u16, String) {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = Self::extract_error_message(&body).unwrap_or(body);
        (status, self.clean(&message))
    }

    async fn remote_error(&self, response: Response) -> FileChatError {
        let (status, message) = self.read_error(response).await;
        FileChatError::RemoteStore { status, message }
    }

    fn clean(&self, message: &str) -> String {
        if self.sanitize_errors {
            sanitize(message)
        } else {
            message.to_string()
        }
    }

    /// Extract the human-readable part of a PostgREST or edge-function error body
    fn extract_error_message(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        ["message", "error", "msg"]
            .iter()
            .find_map(|field| value.get(field).and_then(Value::as_str))
            .map(str::to_string)
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn invoke_function(&self, name: &str, payload: Value) -> Result<FunctionResponse> {
        let url = format!("{}/functions/v1/{}", self.base_url, name);
        debug!("Invoking edge function {}", name);

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, message) = self.read_error(response).await;
            return Ok(FunctionResponse::failed_with_status(
                status,
                format!("HTTP {}: {}", status, message),
            ));
        }

        let body = response.text().await?;
        let data = if body.trim().is_empty() {
            None
        } else {
            // Functions may answer with plain text
            Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
        };
        Ok(FunctionResponse {
            data,
            ..Default::default()
        })
    }

    async fn select_by_key(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let response = self
            .authorized(self.http_client.get(self.rest_url(table)))
            .query(&[("select", "*".to_string()), ("key", format!("eq.{}", key))])
            .query(&[("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.remote_error(response).await);
        }

        let rows: Vec<Value> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<()> {
        let response = self
            .authorized(self.http_client.post(self.rest_url(table)))
            .query(&[("on_conflict", "key")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.remote_error(response).await);
        }
        Ok(())
    }

    async fn delete_by_key(&self, table: &str, key: &str) -> Result<bool> {
        let response = self
            .authorized(self.http_client.delete(self.rest_url(table)))
            .query(&[("key", format!("eq.{}", key))])
            .header("Prefer", "return=representation")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.remote_error(response).await);
        }

        let deleted: Vec<Value> = response.json().await?;
        Ok(!deleted.is_empty())
    }

    async fn rpc(&self, function: &str, args: Value) -> Result<Value> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(&args)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.remote_error(response).await);
        }

        // void functions answer 204 with no body
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_postgrest_error() {
        let body = r#"{"code":"42P01","details":null,"hint":null,"message":"relation \"public.embeddings_cache\" does not exist"}"#;
        assert_eq!(
            SupabaseStore::extract_error_message(body).as_deref(),
            Some("relation \"public.embeddings_cache\" does not exist")
        );
    }

    #[test]
    fn test_extract_function_error() {
        let body = r#"{"error":"Invalid metrics payload"}"#;
        assert_eq!(
            SupabaseStore::extract_error_message(body).as_deref(),
            Some("Invalid metrics payload")
        );
        assert!(SupabaseStore::extract_error_message("Bad Gateway").is_none());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let config = SupabaseConfig {
            url: "https://example.supabase.co/".into(),
            ..Default::default()
        };
        let store = SupabaseStore::new(&config, true).unwrap();
        assert_eq!(store.base_url(), "https://example.supabase.co");
        assert_eq!(
            store.rest_url("embeddings_cache"),
            "https://example.supabase.co/rest/v1/embeddings_cache"
        );
    }

    #[test]
    fn test_empty_url_rejected() {
        let config = SupabaseConfig {
            url: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(
            SupabaseStore::new(&config, true),
            Err(FileChatError::Config(_))
        ));
    }
}
