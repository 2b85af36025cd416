//! Per-operation cache policies

use serde::Deserialize;
use serde_json::Value;

use crate::config::layered::{LayeredResolver, LayeredSettings};

/// How results of an operation are cached
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub enabled: bool,

    /// Time to live in milliseconds; 0 means entries never expire
    pub ttl_ms: u64,

    /// Change sources every entry of the operation is tied to
    pub watch_sources: Vec<String>,

    /// Parameters whose values (string or list of strings) are also watched
    pub watch_parameters: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: 300_000,
            watch_sources: Vec::new(),
            watch_parameters: Vec::new(),
        }
    }
}

impl CachePolicy {
    pub fn enabled(ttl_ms: u64) -> Self {
        Self {
            enabled: true,
            ttl_ms,
            ..Default::default()
        }
    }

    pub fn with_watch_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.watch_parameters.push(parameter.into());
        self
    }

    pub fn with_watch_source(mut self, source: impl Into<String>) -> Self {
        self.watch_sources.push(source.into());
        self
    }

    /// Sources a call with `parameters` should be invalidated by
    pub fn sources_for(&self, parameters: &Value) -> Vec<String> {
        let mut sources = self.watch_sources.clone();

        for name in &self.watch_parameters {
            match parameters.get(name) {
                Some(Value::String(source)) => sources.push(source.clone()),
                Some(Value::Array(items)) => {
                    sources.extend(items.iter().filter_map(|v| v.as_str().map(String::from)));
                }
                _ => {}
            }
        }

        sources.sort();
        sources.dedup();
        sources
    }
}

/// Cache section of the application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub max_size_bytes: usize,
    pub sweep_interval_ms: u64,
    pub policies: LayeredSettings<CachePolicy>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_size_bytes: 50 * 1024 * 1024,
            sweep_interval_ms: 60_000,
            policies: LayeredSettings::default(),
        }
    }
}

/// Resolves the cache policy of an operation: operation override, then category, then global
#[derive(Debug)]
pub struct CachePolicyResolver {
    policies: LayeredResolver<CachePolicy>,
}

impl CachePolicyResolver {
    pub fn new(policies: LayeredSettings<CachePolicy>) -> Self {
        Self {
            policies: LayeredResolver::new(policies),
        }
    }

    pub fn policy(&self, operation: &str) -> CachePolicy {
        self.policies.resolve(operation)
    }

    pub fn is_enabled(&self, operation: &str) -> bool {
        self.policy(operation).enabled
    }

    pub fn assign_category(&self, operation: &str, category: &str) {
        self.policies.assign_category(operation, category);
    }
}

impl Default for CachePolicyResolver {
    fn default() -> Self {
        Self::new(LayeredSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let resolver = CachePolicyResolver::default();

        assert!(!resolver.is_enabled("anything"));
        assert_eq!(resolver.policy("anything").ttl_ms, 300_000);
    }

    #[test]
    fn test_layered_resolution() {
        let resolver = CachePolicyResolver::new(
            LayeredSettings::new(CachePolicy::default())
                .with_category("analysis", CachePolicy::enabled(60_000))
                .with_operation("score", CachePolicy::enabled(0)),
        );
        resolver.assign_category("lint", "analysis");

        assert_eq!(resolver.policy("lint").ttl_ms, 60_000);
        assert_eq!(resolver.policy("score").ttl_ms, 0);
        assert!(!resolver.is_enabled("other"));
    }

    #[test]
    fn test_sources_from_parameters() {
        let policy = CachePolicy::enabled(1000)
            .with_watch_source("config.toml")
            .with_watch_parameter("path")
            .with_watch_parameter("files");

        let sources = policy.sources_for(&json!({
            "path": "src/main.rs",
            "files": ["a.rs", "config.toml", 3],
        }));

        assert_eq!(sources, vec!["a.rs", "config.toml", "src/main.rs"]);
    }

    #[test]
    fn test_deserialize_settings() {
        let settings: CacheSettings = serde_json::from_value(json!({
            "max_entries": 10,
            "policies": {"global": {"enabled": true}}
        }))
        .unwrap();

        assert_eq!(settings.max_entries, 10);
        assert!(settings.policies.global.enabled);
        assert_eq!(settings.policies.global.ttl_ms, 300_000);
        assert_eq!(settings.sweep_interval_ms, 60_000);
    }
}
