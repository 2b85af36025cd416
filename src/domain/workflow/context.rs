//! Workflow execution context and variable resolution
//!
//! A parameter whose entire value is `${dot.path}` is replaced by the value found at that
//! path. Paths are looked up in the run's variables first, then in the recorded step
//! results (`fetch.result.status`, or `steps.fetch.result.status`). Unknown paths resolve
//! to null. Any other parameter value is passed through unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::resilience::CircuitState;

/// A whole-value variable reference: `${path.to.value}`
static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\{\s*([^{}\s]+)\s*\}$").unwrap());

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub success: bool,

    #[serde(default)]
    pub result: Value,

    pub duration_ms: u64,

    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub skipped: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn success(result: Value, duration_ms: u64, attempts: u32) -> Self {
        Self {
            success: true,
            result,
            duration_ms,
            attempts,
            skipped: false,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, duration_ms: u64, attempts: u32) -> Self {
        Self {
            success: false,
            result: Value::Null,
            duration_ms,
            attempts,
            skipped: false,
            error: Some(error.into()),
        }
    }

    /// Condition not met: a vacuous success
    pub fn skipped() -> Self {
        Self {
            success: true,
            result: Value::Null,
            duration_ms: 0,
            attempts: 0,
            skipped: true,
            error: None,
        }
    }
}

/// A step failure recorded in the context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorRecord {
    pub step_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Breaker state of the implicated operation at failure time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_state: Option<CircuitState>,

    /// For breaker-open failures, when the operation will be called again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

impl ExecutionErrorRecord {
    pub fn new(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            tool: None,
            breaker_state: None,
            retry_at: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_breaker_state(mut self, state: Option<CircuitState>) -> Self {
        self.breaker_state = state;
        self
    }

    pub fn with_retry_at(mut self, retry_at: Option<DateTime<Utc>>) -> Self {
        self.retry_at = retry_at;
        self
    }
}

/// Mutable record of a single workflow run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub execution_id: String,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    pub variables: Map<String, Value>,
    pub step_results: BTreeMap<String, StepResult>,
    pub errors: Vec<ExecutionErrorRecord>,
    pub status: ExecutionStatus,

    /// Loop iterations so far, bounded by the engine
    #[serde(default)]
    pub steps_executed: usize,
}

impl ExecutionContext {
    /// Create a context with a fresh execution id
    pub fn new(workflow_id: impl Into<String>, variables: Map<String, Value>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            current_step: None,
            variables,
            step_results: BTreeMap::new(),
            errors: Vec::new(),
            status: ExecutionStatus::Pending,
            steps_executed: 0,
        }
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn record_step(&mut self, step_id: impl Into<String>, result: StepResult) {
        self.step_results.insert(step_id.into(), result);
    }

    pub fn record_error(&mut self, record: ExecutionErrorRecord) {
        self.errors.push(record);
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Mark the run finished with a terminal status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.current_step = None;
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Value at a dot path: variables first, then step results. Unknown paths are null.
    pub fn lookup(&self, path: &str) -> Value {
        let path = path.trim();

        if let Some(value) = get_in_map(&self.variables, path) {
            return value;
        }

        let step_path = path.strip_prefix("steps.").unwrap_or(path);
        let (step_id, rest) = step_path.split_once('.').unwrap_or((step_path, ""));

        let Some(result) = self.step_results.get(step_id) else {
            return Value::Null;
        };

        let Ok(result) = serde_json::to_value(result) else {
            return Value::Null;
        };

        if rest.is_empty() {
            return result;
        }

        get_nested_field(&result, rest).cloned().unwrap_or(Value::Null)
    }

    /// Substitute whole-value `${path}` references in top-level parameters
    pub fn resolve_parameters(&self, parameters: &Map<String, Value>) -> Map<String, Value> {
        parameters
            .iter()
            .map(|(name, value)| (name.clone(), self.resolve_value(value)))
            .collect()
    }

    /// Resolve one parameter value
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value.as_str().and_then(reference_path) {
            Some(path) => self.lookup(path),
            None => value.clone(),
        }
    }
}

/// The path of a whole-value reference, if `text` is one
pub fn reference_path(text: &str) -> Option<&str> {
    REFERENCE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn get_in_map(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let (head, rest) = path.split_once('.').unwrap_or((path, ""));
    let value = map.get(head)?;

    if rest.is_empty() {
        Some(value.clone())
    } else {
        get_nested_field(value, rest).cloned()
    }
}

/// Get a nested field from a JSON value using dot notation
fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        match current {
            Value::Object(obj) => {
                current = obj.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> ExecutionContext {
        let variables = json!({
            "user": {"name": "ada", "roles": ["admin", "dev"]},
            "limit": 10
        });

        let mut ctx = ExecutionContext::new("wf", variables.as_object().unwrap().clone());
        ctx.record_step("fetch", StepResult::success(json!({"status": 200, "items": [1, 2]}), 12, 1));
        ctx
    }

    #[test]
    fn test_new_context() {
        let ctx = ExecutionContext::new("wf", Map::new());

        assert_eq!(ctx.status, ExecutionStatus::Pending);
        assert_eq!(ctx.execution_id.len(), 36);
        assert!(ctx.step_results.is_empty());
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_lookup_variables_first() {
        let ctx = context();

        assert_eq!(ctx.lookup("user.name"), json!("ada"));
        assert_eq!(ctx.lookup("user.roles.1"), json!("dev"));
        assert_eq!(ctx.lookup("limit"), json!(10));
    }

    #[test]
    fn test_lookup_step_results() {
        let ctx = context();

        assert_eq!(ctx.lookup("fetch.result.status"), json!(200));
        assert_eq!(ctx.lookup("steps.fetch.result.items.0"), json!(1));
        assert_eq!(ctx.lookup("fetch.success"), json!(true));
        assert_eq!(ctx.lookup("fetch.durationMs"), json!(12));
    }

    #[test]
    fn test_variable_shadows_step() {
        let mut ctx = context();
        ctx.set_variable("fetch", json!({"result": {"status": 500}}));

        assert_eq!(ctx.lookup("fetch.result.status"), json!(500));
    }

    #[test]
    fn test_unknown_paths_are_null() {
        let ctx = context();

        assert_eq!(ctx.lookup("missing"), Value::Null);
        assert_eq!(ctx.lookup("user.missing"), Value::Null);
        assert_eq!(ctx.lookup("fetch.result.nope"), Value::Null);
    }

    #[test]
    fn test_resolve_parameters() {
        let ctx = context();
        let params = json!({
            "who": "${user.name}",
            "status": "${ fetch.result.status }",
            "literal": "hello ${user.name}",
            "number": 5,
            "nested": {"x": "${limit}"}
        });

        let resolved = ctx.resolve_parameters(params.as_object().unwrap());

        assert_eq!(resolved["who"], json!("ada"));
        assert_eq!(resolved["status"], json!(200));
        assert_eq!(resolved["literal"], json!("hello ${user.name}"));
        assert_eq!(resolved["number"], json!(5));
        assert_eq!(resolved["nested"], json!({"x": "${limit}"}));
    }

    #[test]
    fn test_finish_sets_status() {
        let mut ctx = context();
        ctx.current_step = Some("fetch".to_string());
        ctx.finish(ExecutionStatus::Failed);

        assert_eq!(ctx.status, ExecutionStatus::Failed);
        assert!(ctx.completed_at.is_some());
        assert!(ctx.current_step.is_none());
        assert!(ctx.status.is_terminal());
    }

    #[test]
    fn test_serialization_shape() {
        let mut ctx = context();
        ctx.record_error(ExecutionErrorRecord::new("fetch", "boom").with_tool("http"));

        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["stepResults"]["fetch"]["success"], true);
        assert_eq!(json["errors"][0]["stepId"], "fetch");
        assert_eq!(json["errors"][0]["tool"], "http");
    }
}
