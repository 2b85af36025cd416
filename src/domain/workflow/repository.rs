//! Workflow definition store and completed-run history

use async_trait::async_trait;

use super::context::ExecutionContext;
use super::entity::WorkflowDefinition;
use super::error::WorkflowError;

#[cfg(test)]
use mockall::automock;

/// Repository for stored workflow definitions, keyed by definition id
#[async_trait]
pub trait WorkflowRepository: Send + Sync + std::fmt::Debug {
    /// Get a workflow by ID
    async fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>, WorkflowError>;

    /// List all workflows, ordered by id
    async fn list(&self) -> Result<Vec<WorkflowDefinition>, WorkflowError>;

    /// Store a new workflow; fails with `Conflict` if the id is taken
    async fn create(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError>;

    /// Replace an existing workflow; fails with `NotFound` if absent
    async fn update(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError>;

    /// Delete a workflow by ID
    async fn delete(&self, id: &str) -> Result<bool, WorkflowError>;

    async fn exists(&self, id: &str) -> Result<bool, WorkflowError>;
}

/// Store for terminated execution contexts
///
/// Retention (capacity, age) belongs to the implementation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionHistory: Send + Sync {
    /// Record a finished run
    async fn record(&self, context: ExecutionContext);

    /// Get a finished run by execution id
    async fn get(&self, execution_id: &str) -> Option<ExecutionContext>;

    /// Most recent runs first
    async fn list(&self, limit: usize) -> Vec<ExecutionContext>;
}
