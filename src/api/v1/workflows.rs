//! Stored workflow definitions: validation, CRUD and execution by id

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::{debug, info};

use super::executions::dispatch;
use crate::api::state::AppState;
use crate::api::types::{
    ApiError, AsyncQueryParams, ExecuteByIdRequest, Json, WorkflowsListResponse,
};
use crate::domain::workflow::{validate_value, ValidationReport, WorkflowError};

/// POST /v1/workflows/validate
pub async fn validate_workflow(Json(body): Json<Value>) -> Json<ValidationReport> {
    let (_, report) = validate_value(&body);
    Json(report)
}

/// GET /v1/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<WorkflowsListResponse>, ApiError> {
    let workflows = state.repository.list().await?;
    Ok(Json(WorkflowsListResponse { workflows }))
}

/// POST /v1/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let (definition, report) = validate_value(&body);

    let definition = match definition {
        Some(definition) if report.valid => definition,
        _ => return Err(WorkflowError::validation_errors(report.errors).into()),
    };

    let created = state.repository.create(definition).await?;
    info!(workflow_id = %created.id(), "Workflow stored");

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// GET /v1/workflows/{workflow_id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Response, ApiError> {
    let workflow = state
        .repository
        .get(&workflow_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(&workflow_id))?;

    Ok(Json(workflow).into_response())
}

/// DELETE /v1/workflows/{workflow_id}
pub async fn delete_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.repository.delete(&workflow_id).await? {
        info!(workflow_id = %workflow_id, "Workflow deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(WorkflowError::not_found(workflow_id).into())
    }
}

/// POST /v1/workflows/{workflow_id}/execute
pub async fn execute_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(params): Query<AsyncQueryParams>,
    Json(request): Json<ExecuteByIdRequest>,
) -> Result<Response, ApiError> {
    debug!(
        workflow_id = %workflow_id,
        is_async = params.is_async,
        "Executing stored workflow"
    );

    let definition = state
        .repository
        .get(&workflow_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found(&workflow_id))?;

    dispatch(&state, definition, request.variables, params.is_async).await
}
