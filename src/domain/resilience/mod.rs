//! Resilience domain - circuit breakers and error classification

mod circuit_breaker;
mod config;

pub use circuit_breaker::{
    CallRejected, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
    StateTransition,
};
pub use config::{
    ErrorClassifier, ResilienceConfigError, ResilienceConfigResolver, ResilienceError, ResilienceSettings,
    DEFAULT_CLIENT_ERROR_PATTERN,
};
