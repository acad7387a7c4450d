//! Performance sample model.

// Author: kelexine (https://github.com/kelexine)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One timed operation, as shipped to the metrics-ingestion function.
///
/// Serialized in camelCase with absent optionals omitted:
/// `{"timestamp":…,"operation":…,"duration":…,"success":…,"cacheHit":…,"error":…}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    /// Completion time, epoch milliseconds.
    pub timestamp: i64,
    /// Operation identifier, e.g. `ai.completion`.
    pub operation: String,
    /// Elapsed time in milliseconds.
    pub duration: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PerformanceMetric {
    /// Create a sample stamped with the current time
    pub fn new(operation: impl Into<String>, duration: Duration, success: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            operation: operation.into(),
            duration: duration.as_secs_f64() * 1000.0,
            success,
            cache_hit: None,
            error: None,
        }
    }

    pub fn succeeded(operation: impl Into<String>, duration: Duration) -> Self {
        Self::new(operation, duration, true)
    }

    pub fn failed(operation: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self::new(operation, duration, false).with_error(error)
    }

    pub fn with_cache_hit(mut self, cache_hit: bool) -> Self {
        self.cache_hit = Some(cache_hit);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Override the timestamp (epoch milliseconds)
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let metric = PerformanceMetric::succeeded("rag.search", Duration::from_millis(250))
            .with_cache_hit(true)
            .at(1_700_000_000_000);

        assert_eq!(
            serde_json::to_value(&metric).unwrap(),
            json!({
                "timestamp": 1_700_000_000_000i64,
                "operation": "rag.search",
                "duration": 250.0,
                "success": true,
                "cacheHit": true
            })
        );
    }

    #[test]
    fn test_failed_carries_error() {
        let metric = PerformanceMetric::failed("ai.completion", Duration::ZERO, "quota exceeded");
        assert!(!metric.success);
        assert_eq!(metric.error.as_deref(), Some("quota exceeded"));
        assert_eq!(metric.duration, 0.0);
        assert!(metric.cache_hit.is_none());
    }
}
