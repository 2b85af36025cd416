//! HTTP API types

pub mod error;
pub mod execution;
pub mod json;

pub use error::{ApiError, ApiErrorResponse};
pub use execution::{
    AsyncExecutionCreated, AsyncQueryParams, CancelResponse, ExecuteByIdRequest,
    ExecuteWorkflowRequest, ExecutionsListResponse, InvalidateCacheRequest,
    InvalidateCacheResponse, ListQueryParams, RunningExecution, WorkflowsListResponse,
};
pub use json::Json;
