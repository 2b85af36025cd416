//! Result cache statistics and invalidation

use axum::extract::State;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, InvalidateCacheRequest, InvalidateCacheResponse, Json};
use crate::domain::cache::CacheStats;

/// GET /v1/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.engine.cache_stats())
}

/// POST /v1/cache/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateCacheRequest>,
) -> Result<Json<InvalidateCacheResponse>, ApiError> {
    let cache = state.engine.cache();

    let invalidated = if request.all {
        cache.clear()
    } else if !request.sources.is_empty() {
        state.engine.invalidate_sources(&request.sources)
    } else if let Some(key) = &request.key {
        usize::from(cache.invalidate_key(key))
    } else if let Some(operation) = &request.operation {
        cache.invalidate_operation(operation)
    } else {
        return Err(ApiError::bad_request(
            "One of 'sources', 'key', 'operation' or 'all' is required",
        ));
    };

    info!(invalidated, "Cache invalidated via API");
    Ok(Json(InvalidateCacheResponse { invalidated }))
}
