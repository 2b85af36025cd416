//! Tool error types

use thiserror::Error;

/// Errors a tool can return from `execute`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Client-style errors: the operation answered, the request was wrong
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameters(_) | Self::Unauthorized(_) | Self::NotFound(_)
        )
    }

    /// Short machine-readable kind, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Execution(_) => "execution",
            Self::Timeout { .. } => "timeout",
            Self::Network(_) => "network",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidParameters(_) => "invalid_parameters",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ToolError::network("connection refused").to_string(),
            "Network error: connection refused"
        );
        assert_eq!(ToolError::timeout(250).to_string(), "Timed out after 250ms");
    }

    #[test]
    fn test_client_errors() {
        assert!(ToolError::invalid_parameters("x").is_client_error());
        assert!(ToolError::unauthorized("x").is_client_error());
        assert!(ToolError::not_found("x").is_client_error());
        assert!(!ToolError::unavailable("503").is_client_error());
        assert!(!ToolError::execution("boom").is_client_error());
    }
}
