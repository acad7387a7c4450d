//! Cached response record and cache statistics.

// Author: kelexine (https://github.com/kelexine)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One cached AI response, as stored in the cache table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Hash of prompt, provider and metadata; unique in the table.
    pub key: String,
    pub prompt: String,
    pub response: String,
    /// Provider identifier, e.g. `openai`.
    pub provider: String,
    pub tokens_used: u64,
    pub estimated_cost: f64,
    pub user_id: String,
    #[serde(default)]
    pub metadata: Value,
    /// Stored in the `expires_at` column.
    #[serde(rename = "expires_at")]
    pub expiration_date: DateTime<Utc>,
    /// Advisory; this layer writes it once and never increments it.
    #[serde(default)]
    pub access_count: u64,
}

impl CachedResponse {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from either tier.
    pub hits: u64,
    /// Subset of `hits` answered by the in-process tier.
    pub local_hits: u64,
    /// Lookups that found nothing usable, expired entries included.
    pub misses: u64,
    /// Entries found past their expiration date.
    pub expired: u64,
    /// Successful remote writes.
    pub stores: u64,
    /// Failures absorbed by the cache.
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_round_trip_uses_expires_at_column() {
        let row = json!({
            "id": "6f1c",
            "key": "abc",
            "prompt": "P",
            "response": "R",
            "provider": "openai",
            "tokens_used": 10,
            "estimated_cost": 0.01,
            "user_id": "u1",
            "metadata": {},
            "expires_at": "2030-01-01T00:00:00+00:00",
            "access_count": 4,
            "created_at": "2029-12-25T00:00:00+00:00"
        });
        let entry: CachedResponse = serde_json::from_value(row).unwrap();
        assert_eq!(entry.response, "R");
        assert_eq!(entry.access_count, 4);
        assert!(!entry.is_expired_at("2029-06-01T00:00:00Z".parse().unwrap()));
        assert!(entry.is_expired_at("2030-01-01T00:00:00Z".parse().unwrap()));

        let back = serde_json::to_value(&entry).unwrap();
        assert!(back.get("expires_at").is_some());
        assert!(back.get("expiration_date").is_none());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
