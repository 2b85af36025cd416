//! Workflow error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::resilience::CircuitState;

/// Errors that can occur during workflow operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Operation '{tool}' is not registered (step '{step}')")]
    UnregisteredOperation { step: String, tool: String },

    #[error("Timeout in step '{step}' after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    #[error("Step execution failed in '{step}': {message}")]
    StepExecution { step: String, message: String },

    #[error("Circuit breaker for '{operation}' is {state} in step '{step}'; retry after {retry_at}")]
    CircuitOpen {
        step: String,
        operation: String,
        state: CircuitState,
        retry_at: DateTime<Utc>,
    },

    #[error("Concurrent execution limit of {limit} reached")]
    ConcurrencyLimit { limit: usize },

    #[error("Workflow timed out after {timeout_ms}ms")]
    WorkflowTimeout { timeout_ms: u64 },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid condition: {0}")]
    Condition(String),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            errors: vec![message.into()],
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn step_not_found(id: impl Into<String>) -> Self {
        Self::StepNotFound(id.into())
    }

    pub fn unregistered_operation(step: impl Into<String>, tool: impl Into<String>) -> Self {
        Self::UnregisteredOperation {
            step: step.into(),
            tool: tool.into(),
        }
    }

    pub fn step_timeout(step: impl Into<String>, timeout_ms: u64) -> Self {
        Self::StepTimeout {
            step: step.into(),
            timeout_ms,
        }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn concurrency_limit(limit: usize) -> Self {
        Self::ConcurrencyLimit { limit }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn cancelled(execution_id: impl Into<String>) -> Self {
        Self::Cancelled(execution_id.into())
    }

    pub fn condition(message: impl Into<String>) -> Self {
        Self::Condition(message.into())
    }

    /// Whether a step retry policy applies to this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StepTimeout { .. } | Self::StepExecution { .. })
    }

    /// Underlying message without the step prefix, for error records
    pub fn message(&self) -> String {
        match self {
            Self::StepExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Breaker state and retry time for breaker-open failures
    pub fn breaker_details(&self) -> Option<(CircuitState, DateTime<Utc>)> {
        match self {
            Self::CircuitOpen {
                state, retry_at, ..
            } => Some((*state, *retry_at)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::not_found("test-workflow");
        assert_eq!(err.to_string(), "Workflow not found: test-workflow");

        let err = WorkflowError::step_execution("step1", "Connection failed");
        assert_eq!(
            err.to_string(),
            "Step execution failed in 'step1': Connection failed"
        );

        let err = WorkflowError::step_timeout("slow-step", 5000);
        assert_eq!(err.to_string(), "Timeout in step 'slow-step' after 5000ms");

        let err = WorkflowError::validation_errors(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Workflow validation failed: a; b");
    }

    #[test]
    fn test_retryable() {
        assert!(WorkflowError::step_timeout("s", 10).is_retryable());
        assert!(WorkflowError::step_execution("s", "boom").is_retryable());
        assert!(!WorkflowError::unregistered_operation("s", "nope").is_retryable());

        let open = WorkflowError::CircuitOpen {
            step: "s".to_string(),
            operation: "op".to_string(),
            state: CircuitState::Open,
            retry_at: Utc::now(),
        };
        assert!(!open.is_retryable());
        assert_eq!(open.breaker_details().map(|(s, _)| s), Some(CircuitState::Open));
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(WorkflowError::not_found("test"), WorkflowError::not_found("test"));
        assert_ne!(WorkflowError::not_found("test"), WorkflowError::not_found("other"));
    }
}
