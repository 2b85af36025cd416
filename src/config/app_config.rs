use serde::Deserialize;

use crate::domain::cache::CacheSettings;
use crate::domain::resilience::ResilienceSettings;
use crate::infrastructure::observability::MetricsConfig;
use crate::infrastructure::workflow::EngineSettings;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub engine: EngineSettings,
    pub resilience: ResilienceSettings,
    pub cache: CacheSettings,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and `APP__`-prefixed environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder().build()?.try_deserialize()
    }

    /// Load with an extra configuration file layered over the defaults
    pub fn load_with_file(path: &str) -> Result<Self, config::ConfigError> {
        Self::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_configuration_uses_defaults() {
        let config = from_toml("");

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.engine.max_concurrent_executions, 10);
        assert_eq!(config.resilience.global_timeout_ms, 30_000);
        assert_eq!(config.cache.max_entries, 1_000);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_layered_sections() {
        let config = from_toml(
            r#"
            [logging]
            format = "json"

            [engine]
            max_concurrent_executions = 4

            [resilience.circuit_breaker.global]
            failure_threshold = 3

            [resilience.circuit_breaker.categories.network]
            failure_threshold = 2
            recovery_timeout_ms = 1000

            [resilience.circuit_breaker.operation_categories]
            fetch = "network"

            [cache.policies.operations.lookup]
            enabled = true
            ttl_ms = 5000
            watch_parameters = ["path"]
            "#,
        );

        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.engine.max_concurrent_executions, 4);
        assert_eq!(config.resilience.circuit_breaker.global.failure_threshold, 3);
        assert_eq!(
            config.resilience.circuit_breaker.categories["network"].recovery_timeout_ms,
            1000
        );
        assert_eq!(
            config.resilience.circuit_breaker.operation_categories["fetch"],
            "network"
        );

        let lookup = &config.cache.policies.operations["lookup"];
        assert!(lookup.enabled);
        assert_eq!(lookup.watch_parameters, vec!["path"]);
    }

    #[test]
    fn test_server_address() {
        assert_eq!(AppConfig::default().server_address(), "0.0.0.0:8080");
    }
}
