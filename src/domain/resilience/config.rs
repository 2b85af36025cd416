//! Resilience configuration and error classification

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use crate::config::layered::{LayeredResolver, LayeredSettings, ResolvedFrom};
use crate::domain::tool::ToolError;

/// Default pattern for execution errors that describe a bad request rather than a broken operation
pub const DEFAULT_CLIENT_ERROR_PATTERN: &str =
    r"(?i)\b(validation|invalid|unauthori[sz]ed|forbidden|not found|bad request)\b";

static DEFAULT_CLIENT_ERROR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_CLIENT_ERROR_PATTERN).unwrap());

/// Resilience section of the application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Deadline raced against every protected call; 0 disables it
    pub global_timeout_ms: u64,

    /// Breaker parameters, layered global → category → operation
    pub circuit_breaker: LayeredSettings<CircuitBreakerConfig>,

    /// Case-insensitive pattern matched against execution error messages
    pub client_error_pattern: String,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            global_timeout_ms: 30_000,
            circuit_breaker: LayeredSettings::default(),
            client_error_pattern: DEFAULT_CLIENT_ERROR_PATTERN.to_string(),
        }
    }
}

/// Decides whether a tool error counts against a circuit breaker
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    client_pattern: Regex,
}

impl ErrorClassifier {
    pub fn new(client_error_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            client_pattern: Regex::new(client_error_pattern)?,
        })
    }

    /// Timeouts, network failures, unavailability and unrecognized execution errors trip
    /// the breaker. Validation, auth and not-found style errors pass through.
    pub fn is_breaker_triggering(&self, error: &ToolError) -> bool {
        match error {
            ToolError::Timeout { .. } | ToolError::Network(_) | ToolError::Unavailable(_) => true,
            ToolError::InvalidParameters(_)
            | ToolError::Unauthorized(_)
            | ToolError::NotFound(_) => false,
            ToolError::Execution(message) => !self.client_pattern.is_match(message),
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            client_pattern: DEFAULT_CLIENT_ERROR_REGEX.clone(),
        }
    }
}

/// Rejected resilience configuration
#[derive(Debug, Error)]
pub enum ResilienceConfigError {
    #[error("Invalid client_error_pattern: {0}")]
    ClientErrorPattern(#[from] regex::Error),

    #[error("Invalid circuit_breaker.{scope}: {reason}")]
    CircuitBreaker { scope: String, reason: String },
}

/// Supplies breaker parameters per operation and classifies errors
#[derive(Debug)]
pub struct ResilienceConfigResolver {
    breakers: LayeredResolver<CircuitBreakerConfig>,
    global_timeout: Option<Duration>,
    classifier: ErrorClassifier,
}

impl ResilienceConfigResolver {
    pub fn new(settings: ResilienceSettings) -> Result<Self, ResilienceConfigError> {
        validate_breakers(&settings.circuit_breaker)?;

        let classifier = ErrorClassifier::new(&settings.client_error_pattern)?;
        let global_timeout =
            (settings.global_timeout_ms > 0).then(|| Duration::from_millis(settings.global_timeout_ms));

        Ok(Self {
            breakers: LayeredResolver::new(settings.circuit_breaker),
            global_timeout,
            classifier,
        })
    }

    /// Breaker configuration for an operation
    pub fn breaker_config(&self, operation: &str) -> CircuitBreakerConfig {
        self.breakers.resolve(operation)
    }

    pub fn breaker_config_with_source(&self, operation: &str) -> (CircuitBreakerConfig, ResolvedFrom) {
        self.breakers.resolve_with_source(operation)
    }

    pub fn assign_category(&self, operation: &str, category: &str) {
        self.breakers.assign_category(operation, category);
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout
    }

    pub fn is_breaker_triggering(&self, error: &ToolError) -> bool {
        self.classifier.is_breaker_triggering(error)
    }
}

fn validate_breakers(
    layers: &LayeredSettings<CircuitBreakerConfig>,
) -> Result<(), ResilienceConfigError> {
    let scoped = std::iter::once(("global".to_string(), &layers.global))
        .chain(layers.categories.iter().map(|(k, v)| (format!("categories.{k}"), v)))
        .chain(layers.operations.iter().map(|(k, v)| (format!("operations.{k}"), v)));

    for (scope, config) in scoped {
        config
            .validate()
            .map_err(|reason| ResilienceConfigError::CircuitBreaker { scope, reason })?;
    }

    Ok(())
}

impl Default for ResilienceConfigResolver {
    fn default() -> Self {
        Self {
            breakers: LayeredResolver::new(LayeredSettings::default()),
            global_timeout: Some(Duration::from_millis(ResilienceSettings::default().global_timeout_ms)),
            classifier: ErrorClassifier::default(),
        }
    }
}

/// Outcome of a protected call that did not succeed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResilienceError {
    #[error("Circuit breaker for '{operation}' is {state}; retry after {retry_at}")]
    CircuitOpen {
        operation: String,
        state: CircuitState,
        retry_at: DateTime<Utc>,
    },

    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error(transparent)]
    Operation(ToolError),
}

impl ResilienceError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}
