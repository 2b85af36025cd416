//! Toolflow
//!
//! A resilient workflow execution engine:
//! - Declarative workflows of tool calls with conditions and success/failure branches
//! - Per-step retries and timeouts, fail-fast / continue / rollback error policies
//! - Per-operation circuit breakers with layered configuration
//! - Result caching with TTLs, size limits and change-source invalidation

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use api::state::AppState;
use domain::cache::CachePolicyResolver;
use domain::resilience::ResilienceConfigResolver;
use domain::EventBus;
use infrastructure::cache::{ResultCache, ResultCacheConfig};
use infrastructure::resilience::CircuitBreakerManager;
use infrastructure::tool::{builtin_tools, ToolRegistry};
use infrastructure::workflow::{
    EngineComponents, InMemoryWorkflowRepository, MokaExecutionHistory, WorkflowEngine,
};

/// Build an engine from configuration with the builtin tools registered
pub fn create_engine_with_config(config: &AppConfig) -> anyhow::Result<Arc<WorkflowEngine>> {
    let resolver = ResilienceConfigResolver::new(config.resilience.clone())
        .context("Invalid resilience configuration")?;

    let events = Arc::new(EventBus::new());
    let breakers = CircuitBreakerManager::new(Arc::new(resolver)).with_event_bus(events.clone());

    let history = MokaExecutionHistory::new(
        config.engine.history_capacity,
        Duration::from_secs(config.engine.history_ttl_secs),
    );

    let components = EngineComponents {
        registry: Arc::new(ToolRegistry::new()),
        breakers: Arc::new(breakers),
        cache: Arc::new(ResultCache::new(ResultCacheConfig::from(&config.cache))),
        cache_policies: Arc::new(CachePolicyResolver::new(config.cache.policies.clone())),
        history: Arc::new(history),
        events,
    };

    let engine = WorkflowEngine::new(config.engine.clone(), components);

    for tool in builtin_tools() {
        engine
            .register_tool(tool)
            .context("Failed to register builtin tool")?;
    }

    info!(tools = engine.tools().len(), "Workflow engine created");
    Ok(Arc::new(engine))
}

/// Create the application state with default configuration
pub fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default())
}

/// Create the application state with custom configuration
pub fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let engine = create_engine_with_config(config)?;
    let repository = Arc::new(InMemoryWorkflowRepository::new());

    Ok(AppState::new(engine, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resilience::ResilienceSettings;

    #[test]
    fn test_engine_from_default_config() {
        let engine = create_engine_with_config(&AppConfig::default()).unwrap();

        let names: Vec<String> = engine.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "fail", "http", "set", "sleep"]);
        assert_eq!(engine.settings().max_concurrent_executions, 10);
    }

    #[test]
    fn test_invalid_client_error_pattern_is_rejected() {
        let config = AppConfig {
            resilience: ResilienceSettings {
                client_error_pattern: "(".to_string(),
                ..ResilienceSettings::default()
            },
            ..AppConfig::default()
        };

        let err = create_engine_with_config(&config).unwrap_err();
        assert!(format!("{err:#}").contains("client_error_pattern"));
    }

    #[test]
    fn test_builtin_categories_reach_breaker_resolver() {
        let engine = create_engine_with_config(&AppConfig::default()).unwrap();
        let http = engine
            .tools()
            .into_iter()
            .find(|t| t.name == "http")
            .unwrap();

        assert_eq!(http.category.as_deref(), Some("network"));
    }
}
