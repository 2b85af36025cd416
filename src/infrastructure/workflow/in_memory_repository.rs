//! In-memory workflow repository implementation

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::workflow::{WorkflowDefinition, WorkflowError, WorkflowRepository};

/// In-memory implementation of WorkflowRepository
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<BTreeMap<String, WorkflowDefinition>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository pre-populated with workflows
    pub fn with_workflows(workflows: Vec<WorkflowDefinition>) -> Self {
        let map: BTreeMap<String, WorkflowDefinition> = workflows
            .into_iter()
            .map(|w| (w.id().to_string(), w))
            .collect();

        Self {
            workflows: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn get(&self, id: &str) -> Result<Option<WorkflowDefinition>, WorkflowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, WorkflowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.values().cloned().collect())
    }

    async fn create(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
        let mut workflows = self.workflows.write().await;

        if workflows.contains_key(workflow.id()) {
            return Err(WorkflowError::conflict(format!(
                "Workflow '{}' already exists",
                workflow.id()
            )));
        }

        workflows.insert(workflow.id().to_string(), workflow.clone());
        Ok(workflow)
    }

    async fn update(&self, workflow: WorkflowDefinition) -> Result<WorkflowDefinition, WorkflowError> {
        let mut workflows = self.workflows.write().await;

        if !workflows.contains_key(workflow.id()) {
            return Err(WorkflowError::not_found(workflow.id()));
        }

        workflows.insert(workflow.id().to_string(), workflow.clone());
        Ok(workflow)
    }

    async fn delete(&self, id: &str) -> Result<bool, WorkflowError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(id).is_some())
    }

    async fn exists(&self, id: &str) -> Result<bool, WorkflowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::WorkflowStep;

    fn create_test_workflow(id: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(id, format!("Test {}", id), "step1")
            .with_step(WorkflowStep::new("step1", "echo"))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryWorkflowRepository::new();

        let created = repo.create(create_test_workflow("test-1")).await.unwrap();
        assert_eq!(created.id(), "test-1");

        let retrieved = repo.get("test-1").await.unwrap();
        assert_eq!(retrieved.unwrap().name(), "Test test-1");
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let workflow = create_test_workflow("test-1");
        let repo = InMemoryWorkflowRepository::with_workflows(vec![workflow.clone()]);

        let err = repo.create(workflow).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_update() {
        let repo = InMemoryWorkflowRepository::with_workflows(vec![create_test_workflow("test-1")]);

        let updated = repo
            .update(create_test_workflow("test-1").with_version("2.0.0"))
            .await
            .unwrap();
        assert_eq!(updated.version(), "2.0.0");

        let retrieved = repo.get("test-1").await.unwrap().unwrap();
        assert_eq!(retrieved.version(), "2.0.0");
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let repo = InMemoryWorkflowRepository::new();

        let err = repo.update(create_test_workflow("nonexistent")).await.unwrap_err();
        assert_eq!(err, WorkflowError::not_found("nonexistent"));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryWorkflowRepository::with_workflows(vec![create_test_workflow("test-1")]);

        assert!(repo.exists("test-1").await.unwrap());
        assert!(repo.delete("test-1").await.unwrap());
        assert!(!repo.exists("test-1").await.unwrap());

        // Second delete returns false
        assert!(!repo.delete("test-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_ordered_by_id() {
        let repo = InMemoryWorkflowRepository::with_workflows(vec![
            create_test_workflow("b"),
            create_test_workflow("a"),
        ]);

        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .iter()
            .map(|w| w.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let repo = Arc::new(InMemoryWorkflowRepository::new());

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.create(create_test_workflow(&format!("test-{}", i))).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(repo.list().await.unwrap().len(), 10);
    }
}
