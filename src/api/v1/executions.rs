//! Execution endpoints: ad-hoc runs, history and cancellation

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::api::state::AppState;
use crate::api::types::{
    ApiError, AsyncExecutionCreated, AsyncQueryParams, CancelResponse, ExecuteWorkflowRequest,
    ExecutionsListResponse, Json, ListQueryParams, RunningExecution,
};
use crate::domain::workflow::WorkflowDefinition;

/// POST /v1/executions
pub async fn execute(
    State(state): State<AppState>,
    Query(params): Query<AsyncQueryParams>,
    Json(request): Json<ExecuteWorkflowRequest>,
) -> Result<Response, ApiError> {
    debug!(
        workflow_id = %request.workflow.id(),
        is_async = params.is_async,
        "Executing inline workflow"
    );

    dispatch(&state, request.workflow, request.variables, params.is_async).await
}

/// Run a definition inline, or submit it and answer 202 when `is_async`
pub(super) async fn dispatch(
    state: &AppState,
    definition: WorkflowDefinition,
    variables: Map<String, Value>,
    is_async: bool,
) -> Result<Response, ApiError> {
    if is_async {
        let execution_id = state.engine.submit(definition, variables)?;
        info!(execution_id = %execution_id, "Workflow submitted");

        return Ok((
            StatusCode::ACCEPTED,
            Json(AsyncExecutionCreated::running(execution_id)),
        )
            .into_response());
    }

    let result = state.engine.execute(&definition, variables).await?;
    Ok(Json(result).into_response())
}

/// GET /v1/executions
pub async fn list_executions(
    State(state): State<AppState>,
    Query(params): Query<ListQueryParams>,
) -> Json<ExecutionsListResponse> {
    let active = state
        .engine
        .active_executions()
        .into_iter()
        .map(RunningExecution::from)
        .collect();
    let recent = state.engine.recent_executions(params.limit).await;

    Json(ExecutionsListResponse { active, recent })
}

/// GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Response, ApiError> {
    if let Some(context) = state.engine.get_execution(&execution_id).await {
        return Ok(Json(context).into_response());
    }

    state
        .engine
        .active_executions()
        .into_iter()
        .find(|run| run.execution_id == execution_id)
        .map(|run| Json(RunningExecution::from(run)).into_response())
        .ok_or_else(|| execution_not_found(&execution_id))
}

/// POST /v1/executions/{execution_id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    if state.engine.cancel(&execution_id) {
        Ok(Json(CancelResponse { cancelled: true }))
    } else {
        Err(execution_not_found(&execution_id))
    }
}

fn execution_not_found(execution_id: &str) -> ApiError {
    ApiError::not_found(format!("No active or recorded execution '{}'", execution_id))
        .with_code("execution_not_found")
}
