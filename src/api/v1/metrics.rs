use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::types::Json;
use crate::domain::cache::CacheStats;
use crate::infrastructure::workflow::EngineMetrics;

/// Engine counters with cache statistics
#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub engine: EngineMetrics,
    pub success_rate: f64,
    pub cache: CacheStats,
}

/// GET /v1/metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let engine = state.engine.metrics();

    Json(MetricsResponse {
        success_rate: engine.success_rate(),
        engine,
        cache: state.engine.cache_stats(),
    })
}
