//! Queryable in-process engine metrics

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::workflow::ExecutionStatus;

/// Per-tool step counters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StepMetrics {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub attempts: u64,
    pub retries: u64,
    pub breaker_rejections: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: f64,
}

impl StepMetrics {
    fn record(&mut self, success: bool, attempts: u32, duration_ms: u64, rejected: bool) {
        self.executions += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        self.attempts += u64::from(attempts);
        self.retries += u64::from(attempts.saturating_sub(1));
        if rejected {
            self.breaker_rejections += 1;
        }

        self.total_duration_ms += duration_ms;
        self.average_duration_ms = self.total_duration_ms as f64 / self.executions as f64;
    }
}

/// Run and step counters across every workflow the engine has executed
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EngineMetrics {
    pub executions: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: f64,
    pub steps: BTreeMap<String, StepMetrics>,
}

impl EngineMetrics {
    pub(crate) fn record_run(&mut self, status: ExecutionStatus, duration_ms: u64) {
        self.executions += 1;
        match status {
            ExecutionStatus::Completed => self.succeeded += 1,
            ExecutionStatus::Cancelled => self.cancelled += 1,
            _ => self.failed += 1,
        }

        self.total_duration_ms += duration_ms;
        self.average_duration_ms = self.total_duration_ms as f64 / self.executions as f64;
    }

    pub(crate) fn record_step(
        &mut self,
        tool: &str,
        success: bool,
        attempts: u32,
        duration_ms: u64,
        rejected: bool,
    ) {
        self.steps
            .entry(tool.to_string())
            .or_default()
            .record(success, attempts, duration_ms, rejected);
    }

    pub fn success_rate(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.executions as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_counters_and_average() {
        let mut metrics = EngineMetrics::default();

        metrics.record_run(ExecutionStatus::Completed, 100);
        metrics.record_run(ExecutionStatus::Failed, 300);
        metrics.record_run(ExecutionStatus::Cancelled, 200);

        assert_eq!(metrics.executions, 3);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.cancelled, 1);
        assert_eq!(metrics.average_duration_ms, 200.0);
        assert!((metrics.success_rate() - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_step_counters() {
        let mut metrics = EngineMetrics::default();

        metrics.record_step("http", true, 3, 30, false);
        metrics.record_step("http", false, 1, 10, true);

        let http = &metrics.steps["http"];
        assert_eq!(http.executions, 2);
        assert_eq!(http.successes, 1);
        assert_eq!(http.failures, 1);
        assert_eq!(http.attempts, 4);
        assert_eq!(http.retries, 2);
        assert_eq!(http.breaker_rejections, 1);
        assert_eq!(http.average_duration_ms, 20.0);
    }
}
