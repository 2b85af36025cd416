use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::types::Json;
use crate::infrastructure::tool::ToolInfo;

#[derive(Debug, Serialize)]
pub struct ToolsListResponse {
    pub tools: Vec<ToolInfo>,
}

/// GET /v1/tools
pub async fn list_tools(State(state): State<AppState>) -> Json<ToolsListResponse> {
    Json(ToolsListResponse {
        tools: state.engine.tools(),
    })
}
