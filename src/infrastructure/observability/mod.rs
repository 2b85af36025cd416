//! Observability infrastructure - Prometheus metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    create_metrics_router, init_metrics, record_breaker_rejection, record_breaker_transition,
    record_cache_event, record_step_execution, record_workflow_execution, PrometheusMetrics,
};
