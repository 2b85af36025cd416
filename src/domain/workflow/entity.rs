//! Workflow definition entities

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use super::condition::StepCondition;

/// Maximum length for workflow and step IDs
pub const MAX_ID_LENGTH: usize = 100;

/// Valid IDs: alphanumeric, hyphens and underscores, starting with an alphanumeric
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").unwrap());

/// What the engine does when a step fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorStrategy {
    /// Abort the run on the first failure
    #[default]
    #[serde(alias = "fail_fast", alias = "failFast")]
    FailFast,

    /// Tolerate failures up to `maxErrors`
    Continue,

    /// Run the failing step's rollback steps, then abort
    Rollback,
}

/// Workflow-level error handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingPolicy {
    #[serde(default)]
    pub strategy: ErrorStrategy,

    #[serde(default = "default_max_errors")]
    #[validate(range(min = 1, message = "errorHandling.maxErrors must be at least 1"))]
    pub max_errors: u32,
}

fn default_max_errors() -> u32 {
    5
}

impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::FailFast,
            max_errors: default_max_errors(),
        }
    }
}

impl ErrorHandlingPolicy {
    pub fn fail_fast() -> Self {
        Self::default()
    }

    pub fn continue_on_error(max_errors: u32) -> Self {
        Self {
            strategy: ErrorStrategy::Continue,
            max_errors,
        }
    }

    pub fn rollback() -> Self {
        Self {
            strategy: ErrorStrategy::Rollback,
            ..Default::default()
        }
    }
}

/// Per-step retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 100, message = "retryPolicy.maxAttempts must be between 1 and 100"))]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff_ms: u64,

    #[serde(default)]
    pub exponential_backoff: bool,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff_ms,
            exponential_backoff: false,
        }
    }

    pub fn with_exponential_backoff(mut self) -> Self {
        self.exponential_backoff = true;
        self
    }

    /// Delay before retrying after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if !self.exponential_backoff {
            return self.backoff_ms;
        }

        let exponent = attempt.saturating_sub(1).min(32);
        self.backoff_ms.saturating_mul(1u64 << exponent)
    }
}

/// A single invocation of a registered operation within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    #[validate(
        length(min = 1, max = 100, message = "Step id must be 1-100 characters"),
        regex(path = *ID_PATTERN, message = "Step id must be alphanumeric with hyphens or underscores")
    )]
    id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,

    #[validate(length(min = 1, message = "Step tool is required"))]
    tool: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    parameters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<StepCondition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    retry_policy: Option<RetryPolicy>,

    /// Per-step timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "Step timeout must be positive"))]
    timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_success: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_failure: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    rollback_steps: Vec<String>,

    /// Variable that receives the step's successful result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_variable: Option<String>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            tool: tool.into(),
            parameters: Map::new(),
            condition: None,
            retry_policy: None,
            timeout: None,
            on_success: None,
            on_failure: None,
            rollback_steps: Vec::new(),
            output_variable: None,
        }
    }

    // Builder methods

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_on_success(mut self, step_id: impl Into<String>) -> Self {
        self.on_success = Some(step_id.into());
        self
    }

    pub fn with_on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.on_failure = Some(step_id.into());
        self
    }

    pub fn with_rollback_steps(mut self, step_ids: Vec<String>) -> Self {
        self.rollback_steps = step_ids;
        self
    }

    pub fn with_output_variable(mut self, variable: impl Into<String>) -> Self {
        self.output_variable = Some(variable.into());
        self
    }

    // Getters

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name, falling back to the id
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn condition(&self) -> Option<&StepCondition> {
        self.condition.as_ref()
    }

    /// Retry policy, defaulting to a single attempt
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.clone().unwrap_or_default()
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout
    }

    /// Next step on success; an empty reference means the run ends
    pub fn on_success(&self) -> Option<&str> {
        self.on_success.as_deref().filter(|id| !id.is_empty())
    }

    /// Next step on failure; an empty reference means the run ends
    pub fn on_failure(&self) -> Option<&str> {
        self.on_failure.as_deref().filter(|id| !id.is_empty())
    }

    pub fn rollback_steps(&self) -> &[String] {
        &self.rollback_steps
    }

    pub fn output_variable(&self) -> Option<&str> {
        self.output_variable.as_deref().filter(|v| !v.is_empty())
    }
}

/// A declarative workflow: a graph of steps with a start step and error handling policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    #[validate(
        length(min = 1, max = 100, message = "Workflow id must be 1-100 characters"),
        regex(path = *ID_PATTERN, message = "Workflow id must be alphanumeric with hyphens or underscores")
    )]
    id: String,

    #[validate(length(min = 1, message = "Workflow name is required"))]
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default = "default_version")]
    version: String,

    /// Initial variables, overridable by the caller
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    variables: Map<String, Value>,

    #[validate(length(min = 1, message = "Workflow must have at least one step"), nested)]
    steps: Vec<WorkflowStep>,

    #[validate(length(min = 1, message = "Workflow startStep is required"))]
    start_step: String,

    #[serde(default)]
    #[validate(nested)]
    error_handling: ErrorHandlingPolicy,

    /// Overall timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, message = "Workflow timeout must be positive"))]
    timeout: Option<u64>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl WorkflowDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        start_step: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: default_version(),
            variables: Map::new(),
            steps: Vec::new(),
            start_step: start_step.into(),
            error_handling: ErrorHandlingPolicy::default(),
            timeout: None,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_steps(mut self, steps: Vec<WorkflowStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_error_handling(mut self, policy: ErrorHandlingPolicy) -> Self {
        self.error_handling = policy;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    // Getters

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn start_step(&self) -> &str {
        &self.start_step
    }

    pub fn error_handling(&self) -> &ErrorHandlingPolicy {
        &self.error_handling
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get a step by id
    pub fn get_step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// Distinct tool names referenced by the steps, in step order
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = Vec::new();

        for step in &self.steps {
            if !tools.contains(&step.tool()) {
                tools.push(step.tool());
            }
        }

        tools
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_definition_builder() {
        let workflow = WorkflowDefinition::new("deploy", "Deploy", "build")
            .with_description("Build then ship")
            .with_variable("env", json!("prod"))
            .with_step(WorkflowStep::new("build", "compile").with_on_success("ship"))
            .with_step(WorkflowStep::new("ship", "upload"))
            .with_error_handling(ErrorHandlingPolicy::continue_on_error(3));

        assert_eq!(workflow.id(), "deploy");
        assert_eq!(workflow.version(), "1.0.0");
        assert_eq!(workflow.step_count(), 2);
        assert_eq!(workflow.get_step("build").unwrap().on_success(), Some("ship"));
        assert!(workflow.get_step("missing").is_none());
        assert_eq!(workflow.tools(), vec!["compile", "upload"]);
        assert_eq!(workflow.error_handling().strategy, ErrorStrategy::Continue);
    }

    #[test]
    fn test_deserialize_external_format() {
        let workflow: WorkflowDefinition = serde_json::from_value(json!({
            "id": "wf",
            "name": "Workflow",
            "startStep": "a",
            "errorHandling": {"strategy": "fail-fast", "maxErrors": 2},
            "timeout": 5000,
            "steps": [{
                "id": "a",
                "name": "First",
                "tool": "echo",
                "parameters": {"x": "${input}"},
                "retryPolicy": {"maxAttempts": 3, "backoffMs": 100, "exponentialBackoff": true},
                "onSuccess": "b",
                "onFailure": "",
                "rollbackSteps": ["undo"]
            }]
        }))
        .unwrap();

        let step = workflow.get_step("a").unwrap();
        assert_eq!(step.name(), "First");
        assert_eq!(step.retry_policy().max_attempts, 3);
        assert!(step.retry_policy().exponential_backoff);
        assert_eq!(step.on_failure(), None);
        assert_eq!(step.rollback_steps(), ["undo".to_string()]);
        assert_eq!(workflow.timeout_ms(), Some(5000));
        assert_eq!(workflow.error_handling().max_errors, 2);
    }

    #[test]
    fn test_strategy_names() {
        let strategy: ErrorStrategy = serde_json::from_value(json!("rollback")).unwrap();
        assert_eq!(strategy, ErrorStrategy::Rollback);
        assert_eq!(serde_json::to_value(ErrorStrategy::FailFast).unwrap(), json!("fail-fast"));
        assert_eq!(ErrorHandlingPolicy::default().max_errors, 5);
    }

    #[test]
    fn test_retry_delays() {
        let exponential = RetryPolicy::new(3, 100).with_exponential_backoff();
        assert_eq!(exponential.delay_for_attempt(1), 100);
        assert_eq!(exponential.delay_for_attempt(2), 200);
        assert_eq!(exponential.delay_for_attempt(3), 400);

        let constant = RetryPolicy::new(3, 100);
        assert_eq!(constant.delay_for_attempt(3), 100);
    }

    #[test]
    fn test_step_defaults() {
        let step = WorkflowStep::new("only", "echo");

        assert_eq!(step.name(), "only");
        assert_eq!(step.retry_policy(), RetryPolicy::default());
        assert_eq!(step.retry_policy().max_attempts, 1);
        assert!(step.on_success().is_none());
    }
}
