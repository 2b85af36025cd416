//! Request and response types for the workflow and execution endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::workflow::{ExecutionContext, ExecutionStatus, WorkflowDefinition};
use crate::infrastructure::workflow::ActiveExecution;

/// `?async=true` submits the run in the background and answers 202
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsyncQueryParams {
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQueryParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for ListQueryParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    50
}

/// Ad-hoc execution of an inline definition
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteWorkflowRequest {
    pub workflow: WorkflowDefinition,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Execution of a stored definition
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteByIdRequest {
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Response when a run is submitted in the background (HTTP 202)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncExecutionCreated {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

impl AsyncExecutionCreated {
    pub fn running(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            status: ExecutionStatus::Running,
        }
    }
}

/// A run that has not finished yet
#[derive(Debug, Clone, Serialize)]
pub struct RunningExecution {
    #[serde(flatten)]
    pub execution: ActiveExecution,
    pub status: ExecutionStatus,
}

impl From<ActiveExecution> for RunningExecution {
    fn from(execution: ActiveExecution) -> Self {
        Self {
            execution,
            status: ExecutionStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionsListResponse {
    pub active: Vec<RunningExecution>,
    pub recent: Vec<ExecutionContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowsListResponse {
    pub workflows: Vec<WorkflowDefinition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Cache invalidation selector. The first field present wins; `all` clears the cache.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateCacheRequest {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidateCacheResponse {
    pub invalidated: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_async_query_defaults_to_sync() {
        let params: AsyncQueryParams = serde_json::from_str("{}").unwrap();
        assert!(!params.is_async);

        let params: AsyncQueryParams = serde_json::from_str(r#"{"async": true}"#).unwrap();
        assert!(params.is_async);
    }

    #[test]
    fn test_running_execution_is_flattened() {
        let running = RunningExecution::from(ActiveExecution {
            execution_id: "exec-1".to_string(),
            workflow_id: "wf".to_string(),
            started_at: Utc::now(),
            cancel_requested: false,
        });

        let json = serde_json::to_value(&running).unwrap();
        assert_eq!(json["executionId"], "exec-1");
        assert_eq!(json["workflowId"], "wf");
        assert_eq!(json["status"], "running");
    }

    #[test]
    fn test_execute_request_variables_optional() {
        let request: ExecuteWorkflowRequest = serde_json::from_value(serde_json::json!({
            "workflow": {
                "id": "wf",
                "name": "Workflow",
                "startStep": "s1",
                "steps": [{"id": "s1", "tool": "echo"}]
            }
        }))
        .unwrap();

        assert_eq!(request.workflow.id(), "wf");
        assert!(request.variables.is_empty());
    }
}
