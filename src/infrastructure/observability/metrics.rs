//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::config::MetricsConfig;
use crate::domain::resilience::CircuitState;

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("toolflow_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

/// Record a finished workflow run
pub fn record_workflow_execution(workflow_id: &str, status: &str, duration: Duration) {
    let labels = [
        ("workflow", workflow_id.to_string()),
        ("status", status.to_string()),
    ];

    counter!("workflow_executions_total", &labels).increment(1);
    histogram!("workflow_execution_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record a finished step, including all of its attempts
pub fn record_step_execution(tool: &str, success: bool, attempts: u32, duration: Duration) {
    let labels = [
        ("tool", tool.to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    counter!("workflow_step_executions_total", &labels).increment(1);
    histogram!("workflow_step_duration_seconds", &labels).record(duration.as_secs_f64());

    if attempts > 1 {
        counter!("workflow_step_retries_total", "tool" => tool.to_string())
            .increment(u64::from(attempts - 1));
    }
}

/// Record a circuit breaker state change
pub fn record_breaker_transition(operation: &str, from: CircuitState, to: CircuitState) {
    counter!(
        "circuit_breaker_transitions_total",
        "operation" => operation.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);

    gauge!("circuit_breaker_open", "operation" => operation.to_string()).set(match to {
        CircuitState::Open => 1.0,
        _ => 0.0,
    });
}

/// Record a call rejected by an open breaker
pub fn record_breaker_rejection(operation: &str) {
    counter!("circuit_breaker_rejections_total", "operation" => operation.to_string())
        .increment(1);
}

/// Record a cache lookup or maintenance outcome (`hit`, `miss`, `eviction`, `expiration`, `invalidation`)
pub fn record_cache_event(event: &'static str, count: u64) {
    if count > 0 {
        counter!("result_cache_events_total", "event" => event).increment(count);
    }
}
