//! Cache key generation

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Trait for generating cache keys from input data
pub trait CacheKeyGenerator: Send + Sync + Debug {
    /// Generates a cache key from the given components
    fn generate(&self, params: &CacheKeyParams) -> String;
}

/// Parameters for cache key generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheKeyParams {
    /// Operation name
    pub primary: String,
    /// Normalized parameter values keyed by parameter name (sorted)
    pub components: BTreeMap<String, String>,
}

impl CacheKeyParams {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            components: BTreeMap::new(),
        }
    }

    pub fn with_component(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.components.insert(key.into(), value.into());
        self
    }

    /// Build key parameters from an operation name and its call parameters.
    ///
    /// Object keys are sorted at every depth and null members are dropped, so the same
    /// logical call always produces the same components regardless of argument order.
    pub fn from_parameters(operation: impl Into<String>, parameters: &Value) -> Self {
        let mut params = Self::new(operation);

        match normalize(parameters) {
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    params.components.insert(name, value.to_string());
                }
            }
            Some(other) => {
                params.components.insert(String::new(), other.to_string());
            }
            None => {}
        }

        params
    }
}

/// Recursively drop nulls from objects. `serde_json::Map` keeps keys sorted.
fn normalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| normalize(item).unwrap_or(Value::Null))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

/// SHA-256 hex keys over the JSON array `[operation, {name: value, ...}]`.
/// JSON escaping keeps every distinct parameter set distinct.
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyGenerator;

impl DefaultKeyGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl CacheKeyGenerator for DefaultKeyGenerator {
    fn generate(&self, params: &CacheKeyParams) -> String {
        let canonical = serde_json::json!([params.primary, params.components]).to_string();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(operation: &str, parameters: Value) -> String {
        DefaultKeyGenerator::new().generate(&CacheKeyParams::from_parameters(operation, &parameters))
    }

    #[test]
    fn test_key_ignores_argument_order() {
        assert_eq!(
            key("fetch", json!({"a": 1, "b": {"y": 2, "x": 1}})),
            key("fetch", json!({"b": {"x": 1, "y": 2}, "a": 1}))
        );
    }

    #[test]
    fn test_key_drops_nulls() {
        assert_eq!(
            key("fetch", json!({"a": 1, "b": null})),
            key("fetch", json!({"a": 1}))
        );
    }

    #[test]
    fn test_key_differs_by_operation_and_params() {
        let base = key("fetch", json!({"a": 1}));

        assert_ne!(base, key("store", json!({"a": 1})));
        assert_ne!(base, key("fetch", json!({"a": 2})));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_separator_characters_in_names_do_not_collide() {
        assert_ne!(
            key("op", json!({"a": 1, "x": 1})),
            key("op", json!({"a=1:x": 1}))
        );
        assert_ne!(
            key("op:a", json!({"b": 1})),
            key("op", json!({"a=b": 1}))
        );
        assert_ne!(
            key("op", json!({"a": "1:b=2"})),
            key("op", json!({"a": "1", "b": 2}))
        );
    }

    #[test]
    fn test_components_are_sorted() {
        let params = CacheKeyParams::from_parameters("op", &json!({"z": "1", "a": true}));
        let names: Vec<_> = params.components.keys().cloned().collect();

        assert_eq!(names, vec!["a", "z"]);
        assert_eq!(params.components["z"], "\"1\"");
    }

    #[test]
    fn test_with_component() {
        let params = CacheKeyParams::new("op").with_component("k", "v");
        assert_eq!(params.components.get("k"), Some(&"v".to_string()));
    }
}
