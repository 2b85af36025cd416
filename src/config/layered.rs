//! Layered per-operation settings
//!
//! Resolution order: operation-specific override, then the operation's category
//! default, then the global fallback.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::Deserialize;

/// Settings that can be overridden per category and per operation
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LayeredSettings<T> {
    /// Fallback used when neither an operation nor a category override exists
    #[serde(default)]
    pub global: T,

    /// Defaults keyed by category name
    #[serde(default)]
    pub categories: HashMap<String, T>,

    /// Overrides keyed by operation name
    #[serde(default)]
    pub operations: HashMap<String, T>,

    /// Static operation -> category assignments
    #[serde(default)]
    pub operation_categories: HashMap<String, String>,
}

impl<T> LayeredSettings<T> {
    pub fn new(global: T) -> Self {
        Self {
            global,
            categories: HashMap::new(),
            operations: HashMap::new(),
            operation_categories: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>, value: T) -> Self {
        self.categories.insert(category.into(), value);
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>, value: T) -> Self {
        self.operations.insert(operation.into(), value);
        self
    }

    pub fn with_operation_category(
        mut self,
        operation: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        self.operation_categories
            .insert(operation.into(), category.into());
        self
    }
}

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFrom {
    Operation,
    Category(String),
    Global,
}

/// Resolves layered settings, with category assignments that can grow at runtime
/// (tools declare their category when they are registered)
#[derive(Debug)]
pub struct LayeredResolver<T> {
    settings: LayeredSettings<T>,
    runtime_categories: DashMap<String, String>,
}

impl<T: Clone> LayeredResolver<T> {
    pub fn new(settings: LayeredSettings<T>) -> Self {
        Self {
            settings,
            runtime_categories: DashMap::new(),
        }
    }

    /// Assign a category to an operation. Static configuration wins over runtime assignment.
    pub fn assign_category(&self, operation: impl Into<String>, category: impl Into<String>) {
        self.runtime_categories
            .insert(operation.into(), category.into());
    }

    /// Category of an operation, if any
    pub fn category_of(&self, operation: &str) -> Option<String> {
        if let Some(category) = self.settings.operation_categories.get(operation) {
            return Some(category.clone());
        }

        self.runtime_categories
            .get(operation)
            .map(|entry| entry.value().clone())
    }

    /// Resolve the value for an operation
    pub fn resolve(&self, operation: &str) -> T {
        self.resolve_with_source(operation).0
    }

    /// Resolve the value for an operation and report which layer supplied it
    pub fn resolve_with_source(&self, operation: &str) -> (T, ResolvedFrom) {
        if let Some(value) = self.settings.operations.get(operation) {
            return (value.clone(), ResolvedFrom::Operation);
        }

        if let Some(category) = self.category_of(operation) {
            if let Some(value) = self.settings.categories.get(&category) {
                return (value.clone(), ResolvedFrom::Category(category));
            }
        }

        (self.settings.global.clone(), ResolvedFrom::Global)
    }

    pub fn global(&self) -> &T {
        &self.settings.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> LayeredSettings<u32> {
        LayeredSettings::new(1)
            .with_category("network", 2)
            .with_operation("special", 3)
            .with_operation_category("fetch", "network")
    }

    #[test]
    fn test_operation_override_wins() {
        let resolver = LayeredResolver::new(settings().with_operation_category("special", "network"));

        assert_eq!(resolver.resolve_with_source("special"), (3, ResolvedFrom::Operation));
    }

    #[test]
    fn test_category_default() {
        let resolver = LayeredResolver::new(settings());

        assert_eq!(
            resolver.resolve_with_source("fetch"),
            (2, ResolvedFrom::Category("network".to_string()))
        );
    }

    #[test]
    fn test_global_fallback() {
        let resolver = LayeredResolver::new(settings());

        assert_eq!(resolver.resolve_with_source("unknown"), (1, ResolvedFrom::Global));
    }

    #[test]
    fn test_runtime_category_assignment() {
        let resolver = LayeredResolver::new(settings());
        resolver.assign_category("download", "network");

        assert_eq!(resolver.resolve("download"), 2);
        assert_eq!(resolver.category_of("download"), Some("network".to_string()));
    }

    #[test]
    fn test_static_category_beats_runtime() {
        let resolver = LayeredResolver::new(settings().with_category("local", 5));
        resolver.assign_category("fetch", "local");

        assert_eq!(resolver.resolve("fetch"), 2);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"global": 7, "operations": {"a": 9}}"#;
        let settings: LayeredSettings<u32> = serde_json::from_str(json).unwrap();

        assert_eq!(settings.global, 7);
        assert_eq!(settings.operations.get("a"), Some(&9));
        assert!(settings.categories.is_empty());
    }
}
