//! Named tool registry

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::domain::tool::Tool;
use crate::domain::workflow::WorkflowError;

/// Public description of a registered tool
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub description: String,
}

impl ToolInfo {
    fn of(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            category: tool.category().map(str::to_string),
            description: tool.description().to_string(),
        }
    }
}

/// Tools available to workflow steps, keyed by name
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are unique.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<ToolInfo, WorkflowError> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(WorkflowError::validation("Tool name is required"));
        }

        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&name) {
            return Err(WorkflowError::conflict(format!(
                "Tool '{}' is already registered",
                name
            )));
        }

        let info = ToolInfo::of(tool.as_ref());
        tools.insert(name, tool);
        Ok(info)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered tools, ordered by name
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|tool| ToolInfo::of(tool.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
