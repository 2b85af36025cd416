//! Health check endpoints for Kubernetes probes

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::api::types::Json;
use crate::domain::resilience::CircuitState;

use super::state::AppState;

/// Detailed health response with component status
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<HealthCheck>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health check
#[derive(Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus, message: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

/// Simple health check - returns 200 if the service is running
pub async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: None,
        latency_ms: None,
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check against engine capacity, registered tools and breaker states
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let checks = vec![
        check_capacity(&state),
        check_tools(&state),
        check_breakers(&state),
    ];

    let overall_status = checks
        .iter()
        .map(|c| c.status)
        .fold(HealthStatus::Healthy, worst);

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: Some(checks),
        latency_ms: Some(start.elapsed().as_millis() as u64),
    };

    let status_code = match overall_status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

/// Liveness check - used by Kubernetes to detect crashes
pub async fn live_check() -> impl IntoResponse {
    StatusCode::OK
}

fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    match (a, b) {
        (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
        (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
        _ => HealthStatus::Healthy,
    }
}

fn check_capacity(state: &AppState) -> HealthCheck {
    let limit = state.engine.settings().max_concurrent_executions;
    let active = state.engine.active_executions().len();
    let message = Some(format!("{}/{} run slots in use", active, limit));

    let status = if active >= limit {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthCheck::new("engine", status, message)
}

fn check_tools(state: &AppState) -> HealthCheck {
    let count = state.engine.tools().len();

    if count == 0 {
        HealthCheck::new(
            "tools",
            HealthStatus::Unhealthy,
            Some("No tools registered".to_string()),
        )
    } else {
        HealthCheck::new(
            "tools",
            HealthStatus::Healthy,
            Some(format!("{} registered", count)),
        )
    }
}

fn check_breakers(state: &AppState) -> HealthCheck {
    let open: Vec<String> = state
        .engine
        .breaker_health()
        .into_iter()
        .filter(|b| b.state == CircuitState::Open)
        .map(|b| b.operation)
        .collect();

    if open.is_empty() {
        HealthCheck::new("circuit_breakers", HealthStatus::Healthy, None)
    } else {
        HealthCheck::new(
            "circuit_breakers",
            HealthStatus::Degraded,
            Some(format!("Open: {}", open.join(", "))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn test_worst_status_wins() {
        assert_eq!(
            worst(HealthStatus::Healthy, HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            worst(HealthStatus::Unhealthy, HealthStatus::Degraded),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            worst(HealthStatus::Healthy, HealthStatus::Healthy),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            version: "1.0.0".to_string(),
            checks: Some(vec![HealthCheck::new(
                "circuit_breakers",
                HealthStatus::Degraded,
                Some("Open: http".to_string()),
            )]),
            latency_ms: Some(1),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"circuit_breakers\""));
        assert!(json.contains("\"Open: http\""));
    }
}
