//! Tool trait and closure adapter

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use super::error::ToolError;

/// A named operation a workflow step can invoke
#[async_trait]
pub trait Tool: Send + Sync + fmt::Debug {
    /// Registry name, referenced by `step.tool`
    fn name(&self) -> &str;

    /// Category used for layered breaker and cache configuration
    fn category(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> &str {
        ""
    }

    /// Execute the operation with resolved parameters
    async fn execute(&self, parameters: Value) -> Result<Value, ToolError>;
}

type BoxedHandler = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>> + Send + Sync,
>;

/// Tool backed by an async closure
pub struct FnTool {
    name: String,
    category: Option<String>,
    description: String,
    handler: BoxedHandler,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            category: None,
            description: String::new(),
            handler: Box::new(move |params| Box::pin(handler(params))),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, parameters: Value) -> Result<Value, ToolError> {
        (self.handler)(parameters).await
    }
}
