//! Engine lifecycle events and the observer list that delivers them
//!
//! Listeners run synchronously on the emitting task, in registration order.
//! A listener must not subscribe or emit from inside its callback.

use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::resilience::CircuitState;

/// Discrete lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
    },
    WorkflowCompleted {
        execution_id: String,
        workflow_id: String,
        execution_time_ms: u64,
    },
    WorkflowFailed {
        execution_id: String,
        workflow_id: String,
        error: String,
    },
    WorkflowCancelled {
        execution_id: String,
        workflow_id: String,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
        tool: String,
        success: bool,
        attempts: u32,
        duration_ms: u64,
    },
    StepSkipped {
        execution_id: String,
        step_id: String,
    },
    RollbackStarted {
        execution_id: String,
        step_id: String,
        rollback_steps: Vec<String>,
    },
    RollbackCompleted {
        execution_id: String,
        step_id: String,
        failed_rollbacks: usize,
    },
    BreakerStateChanged {
        operation: String,
        from: CircuitState,
        to: CircuitState,
        timestamp: DateTime<Utc>,
    },
    BreakerFailure {
        operation: String,
        error: String,
        state: CircuitState,
    },
    BreakerSuccess {
        operation: String,
        state: CircuitState,
    },
    ToolRegistered {
        name: String,
        category: Option<String>,
    },
}

impl EngineEvent {
    /// Event name as it appears in the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::WorkflowFailed { .. } => "workflow_failed",
            Self::WorkflowCancelled { .. } => "workflow_cancelled",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepSkipped { .. } => "step_skipped",
            Self::RollbackStarted { .. } => "rollback_started",
            Self::RollbackCompleted { .. } => "rollback_completed",
            Self::BreakerStateChanged { .. } => "breaker_state_changed",
            Self::BreakerFailure { .. } => "breaker_failure",
            Self::BreakerSuccess { .. } => "breaker_success",
            Self::ToolRegistered { .. } => "tool_registered",
        }
    }
}

/// Receives engine events
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

impl<F> EventListener for F
where
    F: Fn(&EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent) {
        self(event)
    }
}

/// Ordered list of listeners
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: EngineEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            listener.on_event(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
