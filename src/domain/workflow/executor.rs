//! Workflow executor trait and result types

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use super::context::{ExecutionContext, ExecutionStatus};
use super::entity::WorkflowDefinition;
use super::error::WorkflowError;

/// Result of executing a workflow
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub execution_id: String,

    /// Whether the run completed successfully
    pub success: bool,

    /// Result of the last successful step, null when none succeeded
    pub result: Value,

    /// Error message if the run failed or was cancelled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub context: ExecutionContext,

    /// Total execution time in milliseconds
    pub execution_time_ms: u64,
}

impl WorkflowExecutionResult {
    /// Build the result from a terminated context
    pub fn from_context(context: ExecutionContext, result: Value, error: Option<String>) -> Self {
        Self {
            execution_id: context.execution_id.clone(),
            success: context.status == ExecutionStatus::Completed,
            result,
            error,
            execution_time_ms: context.duration_ms(),
            context,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.context.status
    }
}

/// Trait for workflow execution
///
/// `Err` is returned only when the run never starts: the definition is invalid or the
/// concurrent-run ceiling is reached. Step failures end up in the result's context.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn execute(
        &self,
        definition: &WorkflowDefinition,
        variables: Map<String, Value>,
    ) -> Result<WorkflowExecutionResult, WorkflowError>;
}
