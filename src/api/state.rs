//! Application state shared by the HTTP handlers

use std::sync::Arc;

use crate::domain::WorkflowRepository;
use crate::infrastructure::workflow::{InMemoryWorkflowRepository, WorkflowEngine};

#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub repository: Arc<dyn WorkflowRepository>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, repository: Arc<dyn WorkflowRepository>) -> Self {
        Self { engine, repository }
    }

    /// State with an empty in-memory workflow store
    pub fn with_engine(engine: Arc<WorkflowEngine>) -> Self {
        Self::new(engine, Arc::new(InMemoryWorkflowRepository::new()))
    }
}
