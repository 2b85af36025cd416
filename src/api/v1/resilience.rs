//! Circuit breaker inspection and manual reset

use axum::extract::{Path, State};
use serde::Serialize;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::resilience::CircuitBreakerSnapshot;

#[derive(Debug, Serialize)]
pub struct BreakersResponse {
    pub breakers: Vec<CircuitBreakerSnapshot>,
}

/// GET /v1/resilience/breakers
pub async fn list_breakers(State(state): State<AppState>) -> Json<BreakersResponse> {
    Json(BreakersResponse {
        breakers: state.engine.breaker_health(),
    })
}

/// POST /v1/resilience/breakers/{name}/reset
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CircuitBreakerSnapshot>, ApiError> {
    let breakers = state.engine.breakers();

    if !breakers.reset(&name) {
        return Err(ApiError::not_found(format!("No circuit breaker for operation '{}'", name))
            .with_code("breaker_not_found"));
    }

    info!(operation = %name, "Circuit breaker reset via API");
    breakers
        .health(&name)
        .map(Json)
        .ok_or_else(|| ApiError::internal(format!("Circuit breaker '{}' vanished after reset", name)))
}
