//! Workflow domain module
//!
//! A workflow is a graph of steps. Each step invokes a registered tool, may be guarded by
//! a condition, may retry, and names the step to run next on success or failure.
//!
//! ## Variable References
//!
//! A parameter whose whole value is `${path}` is replaced at run time:
//! - `${name}` / `${config.region}` - run variables
//! - `${fetch.result.status}` or `${steps.fetch.result.status}` - a recorded step result

mod condition;
mod context;
mod entity;
mod error;
mod executor;
pub mod repository;
pub mod validator;

pub use condition::{is_truthy, ConditionOperator, ConditionPredicate, Expr, StepCondition};
pub use context::{
    reference_path, ExecutionContext, ExecutionErrorRecord, ExecutionStatus, StepResult,
};
pub use entity::{
    ErrorHandlingPolicy, ErrorStrategy, RetryPolicy, WorkflowDefinition, WorkflowStep,
    MAX_ID_LENGTH,
};
pub use error::WorkflowError;
pub use executor::{WorkflowExecutionResult, WorkflowExecutor};
pub use repository::{ExecutionHistory, WorkflowRepository};
pub use validator::{find_cycles, validate, validate_value, ValidationReport};
