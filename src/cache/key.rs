// Cache key derivation
// Author: kelexine (https://github.com/kelexine)

use crate::error::{FileChatError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Joins prompt, provider and metadata before hashing
pub const KEY_SEPARATOR: &str = "::";

/// Derive the cache key for a (prompt, provider, metadata) triple.
///
/// The key is the SHA-256 hex digest of
/// `len(prompt):prompt :: len(provider):provider :: canonical-json(metadata)`,
/// where lengths are byte counts and object keys are sorted at every depth.
/// The length prefixes keep a separator inside the prompt or provider from
/// shifting text across fields.
///
/// Fails with [`FileChatError::InvalidMetadata`] when `metadata` has no JSON
/// representation (e.g. a map keyed by non-strings).
pub fn cache_key<M: Serialize + ?Sized>(prompt: &str, provider: &str, metadata: &M) -> Result<String> {
    let metadata = metadata_value(metadata)?;
    key_for_value(prompt, provider, &metadata)
}

/// Convert caller metadata to JSON, failing with a descriptive error
pub fn metadata_value<M: Serialize + ?Sized>(metadata: &M) -> Result<Value> {
    serde_json::to_value(metadata)
        .map_err(|e| FileChatError::InvalidMetadata(format!("metadata is not representable as JSON: {}", e)))
}

pub(crate) fn key_for_value(prompt: &str, provider: &str, metadata: &Value) -> Result<String> {
    let canonical = serde_json::to_string(&canonicalize(metadata))
        .map_err(|e| FileChatError::InvalidMetadata(e.to_string()))?;

    let mut hasher = Sha256::new();
    for field in [prompt, provider] {
        hasher.update(format!("{}:", field.len()).as_bytes());
        hasher.update(field.as_bytes());
        hasher.update(KEY_SEPARATOR.as_bytes());
    }
    hasher.update(canonical.as_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

/// Rebuild `value` with every object's keys inserted in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (key, nested) in entries {
                sorted.insert(key.clone(), canonicalize(nested));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_is_hex_sha256() {
        let key = cache_key("P", "openai", &json!({})).unwrap();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_nested_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b":{"y":1,"x":[{"q":1,"p":2}]},"a":true}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":true,"b":{"x":[{"p":2,"q":1}],"y":1}}"#).unwrap();
        assert_eq!(canonicalize(&a).to_string(), canonicalize(&b).to_string());
        assert_eq!(
            cache_key("P", "openai", &a).unwrap(),
            cache_key("P", "openai", &b).unwrap()
        );
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            cache_key("P", "openai", &json!([1, 2])).unwrap(),
            cache_key("P", "openai", &json!([2, 1])).unwrap()
        );
    }

    #[test]
    fn test_each_component_changes_key() {
        let base = cache_key("P", "openai", &json!({"k": 1})).unwrap();
        assert_ne!(base, cache_key("P2", "openai", &json!({"k": 1})).unwrap());
        assert_ne!(base, cache_key("P", "mistral", &json!({"k": 1})).unwrap());
        assert_ne!(base, cache_key("P", "openai", &json!({"k": 2})).unwrap());
    }

    #[test]
    fn test_separator_in_fields_cannot_collide() {
        assert_ne!(
            cache_key("a::b", "c", &json!({})).unwrap(),
            cache_key("a", "b::c", &json!({})).unwrap()
        );
        assert_ne!(
            cache_key("P", "openai::{}", &json!({})).unwrap(),
            cache_key("P::openai", "{}", &json!({})).unwrap()
        );
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        let mut metadata: BTreeMap<Vec<u8>, u8> = BTreeMap::new();
        metadata.insert(vec![1, 2], 3);
        let err = cache_key("P", "openai", &metadata).unwrap_err();
        assert!(matches!(err, FileChatError::InvalidMetadata(_)));
        assert!(err.to_string().contains("metadata"));
    }
}
