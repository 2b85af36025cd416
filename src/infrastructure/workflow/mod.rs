//! Workflow infrastructure: the execution engine, run history and definition store

mod engine;
mod history;
mod in_memory_repository;
mod metrics;

pub use engine::{ActiveExecution, EngineComponents, EngineSettings, WorkflowEngine};
pub use history::MokaExecutionHistory;
pub use in_memory_repository::InMemoryWorkflowRepository;
pub use metrics::{EngineMetrics, StepMetrics};
