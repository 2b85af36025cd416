//! Domain layer - workflow model, resilience state machines, cache model and the tool contract

pub mod cache;
pub mod events;
pub mod resilience;
pub mod tool;
pub mod workflow;

pub use events::{EngineEvent, EventBus, EventListener};
pub use tool::{FnTool, Tool, ToolError};
pub use workflow::{
    ExecutionContext, ExecutionHistory, ExecutionStatus, WorkflowDefinition, WorkflowError,
    WorkflowExecutionResult, WorkflowExecutor, WorkflowRepository, WorkflowStep,
};
