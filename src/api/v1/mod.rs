//! v1 API endpoints

pub mod cache;
pub mod executions;
pub mod metrics;
pub mod resilience;
pub mod tools;
pub mod workflows;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/workflows/validate", post(workflows::validate_workflow))
        .route(
            "/workflows",
            get(workflows::list_workflows).post(workflows::create_workflow),
        )
        .route(
            "/workflows/{workflow_id}",
            get(workflows::get_workflow).delete(workflows::delete_workflow),
        )
        .route(
            "/workflows/{workflow_id}/execute",
            post(workflows::execute_workflow),
        )
        .route(
            "/executions",
            get(executions::list_executions).post(executions::execute),
        )
        .route("/executions/{execution_id}", get(executions::get_execution))
        .route(
            "/executions/{execution_id}/cancel",
            post(executions::cancel_execution),
        )
        .route("/tools", get(tools::list_tools))
        .route("/resilience/breakers", get(resilience::list_breakers))
        .route(
            "/resilience/breakers/{name}/reset",
            post(resilience::reset_breaker),
        )
        .route("/cache/stats", get(cache::cache_stats))
        .route("/cache/invalidate", post(cache::invalidate))
        .route("/metrics", get(metrics::get_metrics))
}
