//! Workflow execution engine
//!
//! Walks a validated definition from its start step. Every step calls its tool through
//! the circuit breaker manager; inside the protected call the result cache is consulted
//! first and filled on success. Runs are independent tasks bounded by a semaphore; steps
//! within a run are strictly sequential.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::history::MokaExecutionHistory;
use super::metrics::EngineMetrics;
use crate::domain::cache::{CachePolicyResolver, CacheSetOptions, CacheStats};
use crate::domain::events::{EngineEvent, EventBus, EventListener};
use crate::domain::resilience::{CircuitBreakerSnapshot, ResilienceError};
use crate::domain::tool::{Tool, ToolError};
use crate::domain::workflow::{
    validate, ErrorStrategy, ExecutionContext, ExecutionErrorRecord, ExecutionHistory,
    ExecutionStatus, StepResult, ValidationReport, WorkflowDefinition, WorkflowError,
    WorkflowExecutionResult, WorkflowExecutor, WorkflowStep,
};
use crate::infrastructure::cache::ResultCache;
use crate::infrastructure::observability::{record_step_execution, record_workflow_execution};
use crate::infrastructure::resilience::CircuitBreakerManager;
use crate::infrastructure::tool::{ToolInfo, ToolRegistry};

/// Engine section of the application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Ceiling on simultaneously active runs; further runs are rejected
    pub max_concurrent_executions: usize,

    /// Step timeout when a step declares none; 0 falls back to the resilience global timeout
    pub default_step_timeout_ms: u64,

    pub history_capacity: u64,
    pub history_ttl_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_executions: 10,
            default_step_timeout_ms: 0,
            history_capacity: 1_000,
            history_ttl_secs: 3_600,
        }
    }
}

/// Collaborators owned by an engine instance
pub struct EngineComponents {
    pub registry: Arc<ToolRegistry>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub cache: Arc<ResultCache>,
    pub cache_policies: Arc<CachePolicyResolver>,
    pub history: Arc<dyn ExecutionHistory>,
    pub events: Arc<EventBus>,
}

impl Default for EngineComponents {
    fn default() -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            registry: Arc::new(ToolRegistry::new()),
            breakers: Arc::new(CircuitBreakerManager::default().with_event_bus(events.clone())),
            cache: Arc::new(ResultCache::default()),
            cache_policies: Arc::new(CachePolicyResolver::default()),
            history: Arc::new(MokaExecutionHistory::default()),
            events,
        }
    }
}

/// A run currently executing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecution {
    pub execution_id: String,
    pub workflow_id: String,
    pub started_at: DateTime<Utc>,
    pub cancel_requested: bool,
}

#[derive(Debug)]
struct ActiveRun {
    workflow_id: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Holds a run slot and the active-run entry; both are released on drop
struct RunGuard {
    execution_id: String,
    active: Arc<DashMap<String, ActiveRun>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.execution_id);
    }
}

/// A run that passed admission and holds its slot
struct PreparedRun {
    context: ExecutionContext,
    cancel: CancellationToken,
    guard: RunGuard,
}

/// Outcome of one step including all retry attempts
struct StepOutcome {
    result: Result<Value, WorkflowError>,
    attempts: u32,
    duration_ms: u64,
}

impl StepOutcome {
    fn new(result: Result<Value, WorkflowError>, attempts: u32, started: Instant) -> Self {
        Self {
            result,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Workflow-level time limit of one run
#[derive(Debug, Clone, Copy)]
struct RunDeadline {
    at: Instant,
    timeout_ms: u64,
}

impl RunDeadline {
    fn start(timeout_ms: u64) -> Self {
        Self {
            at: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
        }
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    fn error(&self) -> WorkflowError {
        WorkflowError::WorkflowTimeout {
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Resilient workflow execution engine
pub struct WorkflowEngine {
    settings: EngineSettings,
    registry: Arc<ToolRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    cache: Arc<ResultCache>,
    cache_policies: Arc<CachePolicyResolver>,
    history: Arc<dyn ExecutionHistory>,
    events: Arc<EventBus>,
    run_slots: Arc<Semaphore>,
    active: Arc<DashMap<String, ActiveRun>>,
    metrics: RwLock<EngineMetrics>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("settings", &self.settings)
            .field("tools", &self.registry.len())
            .field("active", &self.active.len())
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(settings: EngineSettings, components: EngineComponents) -> Self {
        let slots = settings.max_concurrent_executions;

        Self {
            settings,
            registry: components.registry,
            breakers: components.breakers,
            cache: components.cache,
            cache_policies: components.cache_policies,
            history: components.history,
            events: components.events,
            run_slots: Arc::new(Semaphore::new(slots)),
            active: Arc::new(DashMap::new()),
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start background maintenance (the cache sweep)
    pub fn start(&self) {
        self.cache.start_sweeper();
        info!(
            max_concurrent_executions = self.settings.max_concurrent_executions,
            "Workflow engine started"
        );
    }

    /// Stop background maintenance and cancel every active run
    pub fn shutdown(&self) {
        self.cache.stop_sweeper();

        for run in self.active.iter() {
            run.value().cancel.cancel();
        }

        info!(cancelled = self.active.len(), "Workflow engine shut down");
    }

    /// Register a tool and its category
    pub fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<ToolInfo, WorkflowError> {
        let info = self.registry.register(tool)?;

        if let Some(category) = &info.category {
            self.breakers.resolver().assign_category(&info.name, category);
            self.cache_policies.assign_category(&info.name, category);
        }

        debug!(tool = %info.name, category = ?info.category, "Tool registered");
        self.events.emit(EngineEvent::ToolRegistered {
            name: info.name.clone(),
            category: info.category.clone(),
        });

        Ok(info)
    }

    pub fn tools(&self) -> Vec<ToolInfo> {
        self.registry.list()
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.events.subscribe(listener);
    }

    pub fn validate(&self, definition: &WorkflowDefinition) -> ValidationReport {
        validate(definition)
    }

    /// Run a workflow to completion.
    ///
    /// Fails only when the definition is invalid, references an unregistered tool, or the
    /// concurrent-run ceiling is reached. Step failures are reported in the result.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        variables: Map<String, Value>,
    ) -> Result<WorkflowExecutionResult, WorkflowError> {
        let prepared = self.prepare(definition, variables)?;
        Ok(self.run(definition, prepared).await)
    }

    /// Admit a run synchronously and execute it on a spawned task. Returns the execution id.
    pub fn submit(
        self: &Arc<Self>,
        definition: WorkflowDefinition,
        variables: Map<String, Value>,
    ) -> Result<String, WorkflowError> {
        let prepared = self.prepare(&definition, variables)?;
        let execution_id = prepared.context.execution_id.clone();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run(&definition, prepared).await;
        });

        Ok(execution_id)
    }

    /// Request cancellation; honoured at the next step boundary or during a retry backoff
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.active.get(execution_id) {
            Some(run) => {
                info!(execution_id, "Cancellation requested");
                run.value().cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_executions(&self) -> Vec<ActiveExecution> {
        let mut runs: Vec<ActiveExecution> = self
            .active
            .iter()
            .map(|entry| ActiveExecution {
                execution_id: entry.key().clone(),
                workflow_id: entry.value().workflow_id.clone(),
                started_at: entry.value().started_at,
                cancel_requested: entry.value().cancel.is_cancelled(),
            })
            .collect();

        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        runs
    }

    pub fn is_active(&self, execution_id: &str) -> bool {
        self.active.contains_key(execution_id)
    }

    /// A finished run from history
    pub async fn get_execution(&self, execution_id: &str) -> Option<ExecutionContext> {
        self.history.get(execution_id).await
    }

    pub async fn recent_executions(&self, limit: usize) -> Vec<ExecutionContext> {
        self.history.list(limit).await
    }

    pub fn metrics(&self) -> EngineMetrics {
        let mut metrics = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        metrics.active = self.active.len();
        metrics
    }

    pub fn breaker_health(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.health_report()
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop cached results watching any of `sources`
    pub fn invalidate_sources(&self, sources: &[String]) -> usize {
        self.cache.invalidate_sources(sources)
    }

    fn prepare(
        &self,
        definition: &WorkflowDefinition,
        variables: Map<String, Value>,
    ) -> Result<PreparedRun, WorkflowError> {
        validate(definition).into_result()?;

        for step in definition.steps() {
            if !self.registry.contains(step.tool()) {
                return Err(WorkflowError::unregistered_operation(step.id(), step.tool()));
            }
        }

        let permit = self
            .run_slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| WorkflowError::concurrency_limit(self.settings.max_concurrent_executions))?;

        let mut seeded = definition.variables().clone();
        seeded.extend(variables);

        let context = ExecutionContext::new(definition.id(), seeded);
        let cancel = CancellationToken::new();

        self.active.insert(
            context.execution_id.clone(),
            ActiveRun {
                workflow_id: definition.id().to_string(),
                started_at: context.started_at,
                cancel: cancel.clone(),
            },
        );

        let guard = RunGuard {
            execution_id: context.execution_id.clone(),
            active: self.active.clone(),
            _permit: permit,
        };

        Ok(PreparedRun {
            context,
            cancel,
            guard,
        })
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        prepared: PreparedRun,
    ) -> WorkflowExecutionResult {
        let span = info_span!(
            "workflow",
            execution_id = %prepared.context.execution_id,
            workflow_id = %definition.id()
        );

        self.run_steps(definition, prepared).instrument(span).await
    }

    async fn run_steps(
        &self,
        definition: &WorkflowDefinition,
        prepared: PreparedRun,
    ) -> WorkflowExecutionResult {
        let PreparedRun {
            mut context,
            cancel,
            guard,
        } = prepared;

        context.status = ExecutionStatus::Running;
        info!(steps = definition.step_count(), "Workflow started");
        self.events.emit(EngineEvent::WorkflowStarted {
            execution_id: context.execution_id.clone(),
            workflow_id: definition.id().to_string(),
        });

        let deadline = definition
            .timeout_ms()
            .filter(|ms| *ms > 0)
            .map(RunDeadline::start);
        let max_steps = definition.step_count() * 2;
        let policy = definition.error_handling().clone();

        let mut current = Some(definition.start_step().to_string());
        let mut last_result = Value::Null;

        let outcome: Result<(), WorkflowError> = loop {
            let Some(step_id) = current.take() else {
                break Ok(());
            };

            if cancel.is_cancelled() {
                break Err(WorkflowError::cancelled(&context.execution_id));
            }

            if let Some(deadline) = deadline.filter(RunDeadline::expired) {
                break Err(deadline.error());
            }

            if context.steps_executed >= max_steps {
                break Err(WorkflowError::execution(format!(
                    "Step limit of {} exceeded",
                    max_steps
                )));
            }

            let Some(step) = definition.get_step(&step_id) else {
                break Err(WorkflowError::step_not_found(step_id));
            };

            context.current_step = Some(step_id.clone());
            context.steps_executed += 1;

            let proceed = match step.condition() {
                Some(condition) => condition.evaluate(&|path| context.lookup(path)),
                None => Ok(true),
            };

            let outcome = match proceed {
                Ok(false) => {
                    debug!(step_id = %step.id(), "Condition not met, skipping step");
                    context.record_step(step.id(), StepResult::skipped());
                    self.events.emit(EngineEvent::StepSkipped {
                        execution_id: context.execution_id.clone(),
                        step_id: step.id().to_string(),
                    });
                    current = step.on_success().map(str::to_string);
                    continue;
                }
                Ok(true) => {
                    self.execute_step(step, &context, deadline, Some(&cancel))
                        .await
                }
                Err(error) => StepOutcome {
                    result: Err(error),
                    attempts: 0,
                    duration_ms: 0,
                },
            };

            self.record_step_metrics(step, &outcome);
            self.events.emit(EngineEvent::StepCompleted {
                execution_id: context.execution_id.clone(),
                step_id: step.id().to_string(),
                tool: step.tool().to_string(),
                success: outcome.result.is_ok(),
                attempts: outcome.attempts,
                duration_ms: outcome.duration_ms,
            });

            match outcome.result {
                Ok(value) => {
                    if let Some(variable) = step.output_variable() {
                        context.set_variable(variable, value.clone());
                    }
                    context.record_step(
                        step.id(),
                        StepResult::success(value.clone(), outcome.duration_ms, outcome.attempts),
                    );
                    last_result = value;
                    current = step.on_success().map(str::to_string);
                }
                Err(error) => {
                    warn!(step_id = %step.id(), tool = %step.tool(), error = %error, "Step failed");
                    context.record_step(
                        step.id(),
                        StepResult::failure(error.message(), outcome.duration_ms, outcome.attempts),
                    );
                    context.record_error(self.error_record(step, &error));

                    // the run itself is over, whatever the step's error policy says
                    if matches!(
                        error,
                        WorkflowError::WorkflowTimeout { .. } | WorkflowError::Cancelled(_)
                    ) {
                        break Err(error);
                    }

                    match policy.strategy {
                        ErrorStrategy::FailFast => break Err(error),
                        ErrorStrategy::Rollback => {
                            self.rollback(definition, step, &mut context).await;
                            break Err(error);
                        }
                        ErrorStrategy::Continue => {
                            if context.error_count() >= policy.max_errors as usize {
                                break Err(WorkflowError::execution(format!(
                                    "Error limit of {} reached; last error: {}",
                                    policy.max_errors, error
                                )));
                            }
                            current = step.on_failure().map(str::to_string);
                        }
                    }
                }
            }
        };

        let result = self.finish(definition, context, outcome, last_result).await;
        drop(guard);
        result
    }

    /// Resolve parameters, then call the tool, retrying per the step's policy.
    ///
    /// A backoff that would outlast the workflow deadline ends the step with a workflow
    /// timeout instead. Cancelling the run interrupts a backoff sleep.
    async fn execute_step(
        &self,
        step: &WorkflowStep,
        context: &ExecutionContext,
        deadline: Option<RunDeadline>,
        cancel: Option<&CancellationToken>,
    ) -> StepOutcome {
        let started = Instant::now();
        let policy = step.retry_policy();
        let max_attempts = policy.max_attempts.max(1);
        let parameters = Value::Object(context.resolve_parameters(step.parameters()));

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(step_id = %step.id(), tool = %step.tool(), attempt, "Executing step");

            let result = self.call_tool(step, &parameters, deadline).await;

            let retry = matches!(&result, Err(error) if error.is_retryable()) && attempt < max_attempts;
            if !retry {
                return StepOutcome::new(result, attempt, started);
            }

            let delay = Duration::from_millis(policy.delay_for_attempt(attempt));

            if let Some(deadline) = deadline {
                if delay >= deadline.remaining() {
                    debug!(
                        step_id = %step.id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retry backoff would pass the workflow deadline"
                    );
                    return StepOutcome::new(Err(deadline.error()), attempt, started);
                }
            }

            if let Err(error) = &result {
                warn!(
                    step_id = %step.id(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Step attempt failed, retrying"
                );
            }

            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let cancelled = WorkflowError::cancelled(&context.execution_id);
                            return StepOutcome::new(Err(cancelled), attempt, started);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    /// One protected call: breaker admission, timeout race, cache lookup and store
    async fn call_tool(
        &self,
        step: &WorkflowStep,
        parameters: &Value,
        deadline: Option<RunDeadline>,
    ) -> Result<Value, WorkflowError> {
        if let Some(deadline) = deadline.filter(RunDeadline::expired) {
            return Err(deadline.error());
        }

        let name = step.tool();
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| WorkflowError::unregistered_operation(step.id(), name))?;

        let policy = self.cache_policies.policy(name);
        let cache = &self.cache;
        let timeout = self.step_timeout(step, deadline);

        let outcome = self
            .breakers
            .execute_with_timeout(name, timeout, move || async move {
                if policy.enabled {
                    if let Some(hit) = cache.get(name, parameters) {
                        return Ok(hit);
                    }
                }

                let value = tool.execute(parameters.clone()).await?;

                if policy.enabled {
                    let options = CacheSetOptions::default()
                        .with_ttl_ms(policy.ttl_ms)
                        .with_watch_sources(policy.sources_for(parameters));
                    cache.set(name, parameters, value.clone(), options);
                }

                Ok::<Value, ToolError>(value)
            })
            .await;

        outcome.map_err(|error| match error {
            ResilienceError::CircuitOpen {
                operation,
                state,
                retry_at,
            } => WorkflowError::CircuitOpen {
                step: step.id().to_string(),
                operation,
                state,
                retry_at,
            },
            ResilienceError::Timeout { timeout_ms, .. } => {
                WorkflowError::step_timeout(step.id(), timeout_ms)
            }
            ResilienceError::Operation(ToolError::Timeout { timeout_ms }) => {
                WorkflowError::step_timeout(step.id(), timeout_ms)
            }
            ResilienceError::Operation(error) => {
                WorkflowError::step_execution(step.id(), error.to_string())
            }
        })
    }

    /// Step timeout, else the engine default, else the global timeout; capped by the
    /// time left before the workflow deadline
    fn step_timeout(&self, step: &WorkflowStep, deadline: Option<RunDeadline>) -> Option<Duration> {
        let configured = step
            .timeout_ms()
            .filter(|ms| *ms > 0)
            .or(Some(self.settings.default_step_timeout_ms).filter(|ms| *ms > 0))
            .map(Duration::from_millis)
            .or_else(|| self.breakers.resolver().global_timeout());

        let remaining = deadline.map(|d| d.remaining());

        match (configured, remaining) {
            (Some(configured), Some(remaining)) => Some(configured.min(remaining)),
            (configured, remaining) => configured.or(remaining),
        }
    }

    /// Run the failing step's rollback steps in reverse order. Failures are logged only.
    async fn rollback(
        &self,
        definition: &WorkflowDefinition,
        failed_step: &WorkflowStep,
        context: &mut ExecutionContext,
    ) {
        let rollback_steps = failed_step.rollback_steps();
        if rollback_steps.is_empty() {
            return;
        }

        info!(step_id = %failed_step.id(), count = rollback_steps.len(), "Starting rollback");
        self.events.emit(EngineEvent::RollbackStarted {
            execution_id: context.execution_id.clone(),
            step_id: failed_step.id().to_string(),
            rollback_steps: rollback_steps.to_vec(),
        });

        let mut failed_rollbacks = 0;

        for rollback_id in rollback_steps.iter().rev() {
            let Some(step) = definition.get_step(rollback_id) else {
                warn!(rollback_step = %rollback_id, "Rollback step not found");
                failed_rollbacks += 1;
                continue;
            };

            let outcome = self.execute_step(step, context, None, None).await;
            self.record_step_metrics(step, &outcome);

            match outcome.result {
                Ok(value) => {
                    context.record_step(
                        step.id(),
                        StepResult::success(value, outcome.duration_ms, outcome.attempts),
                    );
                }
                Err(error) => {
                    failed_rollbacks += 1;
                    warn!(rollback_step = %step.id(), error = %error, "Rollback step failed");
                    context.record_step(
                        step.id(),
                        StepResult::failure(error.message(), outcome.duration_ms, outcome.attempts),
                    );
                }
            }
        }

        info!(step_id = %failed_step.id(), failed_rollbacks, "Rollback completed");
        self.events.emit(EngineEvent::RollbackCompleted {
            execution_id: context.execution_id.clone(),
            step_id: failed_step.id().to_string(),
            failed_rollbacks,
        });
    }

    fn error_record(&self, step: &WorkflowStep, error: &WorkflowError) -> ExecutionErrorRecord {
        let (state, retry_at) = match error.breaker_details() {
            Some((state, retry_at)) => (Some(state), Some(retry_at)),
            None => (self.breakers.state(step.tool()), None),
        };

        ExecutionErrorRecord::new(step.id(), error.message())
            .with_tool(step.tool())
            .with_breaker_state(state)
            .with_retry_at(retry_at)
    }

    fn record_step_metrics(&self, step: &WorkflowStep, outcome: &StepOutcome) {
        let success = outcome.result.is_ok();
        let rejected = matches!(outcome.result, Err(WorkflowError::CircuitOpen { .. }));

        record_step_execution(
            step.tool(),
            success,
            outcome.attempts,
            Duration::from_millis(outcome.duration_ms),
        );

        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_step(step.tool(), success, outcome.attempts, outcome.duration_ms, rejected);
    }

    async fn finish(
        &self,
        definition: &WorkflowDefinition,
        mut context: ExecutionContext,
        outcome: Result<(), WorkflowError>,
        last_result: Value,
    ) -> WorkflowExecutionResult {
        let (status, error) = match outcome {
            Ok(()) => (ExecutionStatus::Completed, None),
            Err(error @ WorkflowError::Cancelled(_)) => {
                (ExecutionStatus::Cancelled, Some(error.to_string()))
            }
            Err(error) => (ExecutionStatus::Failed, Some(error.to_string())),
        };

        context.finish(status);
        let duration_ms = context.duration_ms();

        let execution_id = context.execution_id.clone();
        let workflow_id = definition.id().to_string();

        match (&status, &error) {
            (ExecutionStatus::Completed, _) => {
                info!(duration_ms, errors = context.error_count(), "Workflow completed");
                self.events.emit(EngineEvent::WorkflowCompleted {
                    execution_id,
                    workflow_id,
                    execution_time_ms: duration_ms,
                });
            }
            (ExecutionStatus::Cancelled, _) => {
                info!(duration_ms, "Workflow cancelled");
                self.events.emit(EngineEvent::WorkflowCancelled {
                    execution_id,
                    workflow_id,
                });
            }
            (_, error) => {
                let error = error.clone().unwrap_or_default();
                warn!(duration_ms, error = %error, "Workflow failed");
                self.events.emit(EngineEvent::WorkflowFailed {
                    execution_id,
                    workflow_id,
                    error,
                });
            }
        }

        record_workflow_execution(
            definition.id(),
            status.as_str(),
            Duration::from_millis(duration_ms),
        );
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_run(status, duration_ms);

        self.history.record(context.clone()).await;

        WorkflowExecutionResult::from_context(context, last_result, error)
    }
}

#[async_trait]
impl WorkflowExecutor for WorkflowEngine {
    async fn execute(
        &self,
        definition: &WorkflowDefinition,
        variables: Map<String, Value>,
    ) -> Result<WorkflowExecutionResult, WorkflowError> {
        WorkflowEngine::execute(self, definition, variables).await
    }
}
