//! Circuit breaker manager
//!
//! Owns one breaker per operation name. Each breaker sits behind its own mutex inside a
//! sharded map, so calls to unrelated operations never contend on a shared lock. The
//! mutex is never held across an await point.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::domain::events::{EngineEvent, EventBus};
use crate::domain::resilience::{
    CircuitBreaker, CircuitBreakerSnapshot, CircuitState, ResilienceConfigResolver,
    ResilienceError, StateTransition,
};
use crate::domain::tool::ToolError;
use crate::infrastructure::observability::{record_breaker_rejection, record_breaker_transition};

type SharedBreaker = Arc<Mutex<CircuitBreaker>>;

/// Per-operation circuit breakers with call protection
#[derive(Debug)]
pub struct CircuitBreakerManager {
    resolver: Arc<ResilienceConfigResolver>,
    breakers: DashMap<String, SharedBreaker>,
    events: Arc<EventBus>,
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new(Arc::new(ResilienceConfigResolver::default()))
    }
}

impl CircuitBreakerManager {
    pub fn new(resolver: Arc<ResilienceConfigResolver>) -> Self {
        Self {
            resolver,
            breakers: DashMap::new(),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn resolver(&self) -> &ResilienceConfigResolver {
        &self.resolver
    }

    /// Call `operation` under its breaker and the global timeout
    pub async fn execute_with_protection<T, F, Fut>(
        &self,
        name: &str,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        self.execute_with_timeout(name, self.resolver.global_timeout(), operation)
            .await
    }

    /// Call `operation` under its breaker, racing it against `timeout` when one is given.
    ///
    /// Rejected calls never reach the operation. A timeout counts as a breaker failure.
    pub async fn execute_with_timeout<T, F, Fut>(
        &self,
        name: &str,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ToolError>>,
    {
        let breaker = self.get_or_create(name);

        let admitted = lock(&breaker).try_acquire();
        match admitted {
            Ok(transition) => self.report_transition(name, transition),
            Err(rejected) => {
                debug!(operation = name, state = %rejected.state, "Call rejected by circuit breaker");
                record_breaker_rejection(name);

                return Err(ResilienceError::CircuitOpen {
                    operation: name.to_string(),
                    state: rejected.state,
                    retry_at: rejected.retry_at,
                });
            }
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(ResilienceError::Operation),
                Err(_) => Err(ResilienceError::Timeout {
                    operation: name.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => operation().await.map_err(ResilienceError::Operation),
        };

        match &outcome {
            Ok(_) => self.on_success(name, &breaker),
            Err(ResilienceError::Operation(error)) if !self.resolver.is_breaker_triggering(error) => {
                lock(&breaker).release_probe();
                debug!(
                    operation = name,
                    kind = error.kind(),
                    "Client error passed through without affecting breaker"
                );
            }
            Err(error) => self.on_failure(name, &breaker, &error.to_string()),
        }

        outcome
    }

    /// Current state of an operation's breaker, if one exists
    pub fn state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.get(name).map(|entry| lock(entry.value()).state())
    }

    /// Health snapshot for one operation
    pub fn health(&self, name: &str) -> Option<CircuitBreakerSnapshot> {
        self.breakers
            .get(name)
            .map(|entry| lock(entry.value()).snapshot())
    }

    /// Health snapshots for every operation seen so far, sorted by name
    pub fn health_report(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<SharedBreaker> = self
            .breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut report: Vec<_> = breakers.iter().map(|b| lock(b).snapshot()).collect();
        report.sort_by(|a, b| a.operation.cmp(&b.operation));
        report
    }

    /// Force a breaker back to CLOSED. Returns false when the operation has no breaker.
    pub fn reset(&self, name: &str) -> bool {
        let Some(breaker) = self.breakers.get(name).map(|entry| entry.value().clone()) else {
            return false;
        };

        let transition = lock(&breaker).reset();
        info!(operation = name, "Circuit breaker reset");
        self.report_transition(name, transition);
        true
    }

    pub fn reset_all(&self) {
        let names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();

        for name in names {
            self.reset(&name);
        }
    }

    fn get_or_create(&self, name: &str) -> SharedBreaker {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.resolver.breaker_config(name);
                debug!(
                    operation = name,
                    failure_threshold = config.failure_threshold,
                    recovery_timeout_ms = config.recovery_timeout_ms,
                    "Creating circuit breaker"
                );
                Arc::new(Mutex::new(CircuitBreaker::new(name, config)))
            })
            .value()
            .clone()
    }

    fn on_success(&self, name: &str, breaker: &SharedBreaker) {
        let (transition, state) = {
            let mut guard = lock(breaker);
            let transition = guard.record_success();
            (transition, guard.state())
        };

        self.events.emit(EngineEvent::BreakerSuccess {
            operation: name.to_string(),
            state,
        });
        self.report_transition(name, transition);
    }

    fn on_failure(&self, name: &str, breaker: &SharedBreaker, error: &str) {
        let (transition, state) = {
            let mut guard = lock(breaker);
            let transition = guard.record_failure(error);
            (transition, guard.state())
        };

        self.events.emit(EngineEvent::BreakerFailure {
            operation: name.to_string(),
            error: error.to_string(),
            state,
        });
        self.report_transition(name, transition);
    }

    fn report_transition(&self, name: &str, transition: Option<StateTransition>) {
        let Some(StateTransition { from, to }) = transition else {
            return;
        };

        if to == CircuitState::Open {
            warn!(operation = name, from = %from, to = %to, "Circuit breaker opened");
        } else {
            info!(operation = name, from = %from, to = %to, "Circuit breaker state changed");
        }

        record_breaker_transition(name, from, to);
        self.events.emit(EngineEvent::BreakerStateChanged {
            operation: name.to_string(),
            from,
            to,
            timestamp: Utc::now(),
        });
    }
}

fn lock(breaker: &SharedBreaker) -> std::sync::MutexGuard<'_, CircuitBreaker> {
    breaker.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::layered::LayeredSettings;
    use crate::domain::resilience::{CircuitBreakerConfig, ResilienceSettings};

    fn manager(config: CircuitBreakerConfig) -> CircuitBreakerManager {
        let settings = ResilienceSettings {
            global_timeout_ms: 0,
            circuit_breaker: LayeredSettings::new(config),
            ..Default::default()
        };
        CircuitBreakerManager::new(Arc::new(ResilienceConfigResolver::new(settings).unwrap()))
    }

    async fn failing(manager: &CircuitBreakerManager, calls: &AtomicUsize) -> Result<(), ResilienceError> {
        manager
            .execute_with_protection("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ToolError::unavailable("down"))
            })
            .await
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let manager = manager(CircuitBreakerConfig::new(3, 60_000));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let err = failing(&manager, &calls).await.unwrap_err();
            assert!(matches!(err, ResilienceError::Operation(_)));
        }
        assert_eq!(manager.state("op"), Some(CircuitState::Open));

        let err = failing(&manager, &calls).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_through_half_open() {
        let manager = manager(CircuitBreakerConfig::new(1, 20).with_success_threshold(2));
        let calls = AtomicUsize::new(0);

        failing(&manager, &calls).await.unwrap_err();
        assert_eq!(manager.state("op"), Some(CircuitState::Open));

        tokio::time::sleep(Duration::from_millis(40)).await;

        for _ in 0..2 {
            let value = manager
                .execute_with_protection("op", || async { Ok::<_, ToolError>(1) })
                .await
                .unwrap();
            assert_eq!(value, 1);
        }

        let health = manager.health("op").unwrap();
        assert_eq!(health.state, CircuitState::Closed);
        assert_eq!(health.failure_count, 0);
        assert_eq!(health.success_count, 0);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_trip() {
        let manager = manager(CircuitBreakerConfig::new(1, 60_000));

        for _ in 0..3 {
            let err = manager
                .execute_with_protection("op", || async {
                    Err::<(), _>(ToolError::not_found("no such file"))
                })
                .await
                .unwrap_err();
            assert_eq!(err, ResilienceError::Operation(ToolError::not_found("no such file")));
        }

        assert_eq!(manager.state("op"), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_client_errors_in_half_open_do_not_wedge_breaker() {
        let manager = manager(CircuitBreakerConfig::new(1, 20));
        let calls = AtomicUsize::new(0);

        failing(&manager, &calls).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(40)).await;

        for _ in 0..3 {
            let err = manager
                .execute_with_protection("op", || async {
                    Err::<(), _>(ToolError::not_found("missing"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ResilienceError::Operation(_)));
        }
        assert_eq!(manager.state("op"), Some(CircuitState::HalfOpen));
        assert_eq!(manager.health("op").unwrap().half_open_calls, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;

        for _ in 0..2 {
            manager
                .execute_with_protection("op", || async { Ok::<_, ToolError>(()) })
                .await
                .unwrap();
        }
        assert_eq!(manager.state("op"), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let manager = manager(CircuitBreakerConfig::new(1, 60_000));

        let err = manager
            .execute_with_timeout("slow", Some(Duration::from_millis(10)), || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, ToolError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ResilienceError::Timeout {
                operation: "slow".to_string(),
                timeout_ms: 10
            }
        );
        assert_eq!(manager.state("slow"), Some(CircuitState::Open));
    }

    #[tokio::test]
    async fn test_breakers_are_independent() {
        let manager = manager(CircuitBreakerConfig::new(1, 60_000));
        let calls = AtomicUsize::new(0);

        failing(&manager, &calls).await.unwrap_err();

        let ok = manager
            .execute_with_protection("other", || async { Ok::<_, ToolError>("fine") })
            .await;
        assert_eq!(ok, Ok("fine"));
        assert_eq!(manager.state("other"), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_events_emitted_on_transition() {
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            events.subscribe(Arc::new(move |event: &EngineEvent| {
                seen.lock().unwrap().push(event.name());
            }));
        }

        let manager = manager(CircuitBreakerConfig::new(1, 60_000)).with_event_bus(events);
        let calls = AtomicUsize::new(0);
        failing(&manager, &calls).await.unwrap_err();

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["breaker_failure", "breaker_state_changed"]
        );
    }

    #[tokio::test]
    async fn test_reset_and_report() {
        let manager = manager(CircuitBreakerConfig::new(1, 60_000));
        let calls = AtomicUsize::new(0);
        failing(&manager, &calls).await.unwrap_err();
        manager
            .execute_with_protection("alpha", || async { Ok::<_, ToolError>(()) })
            .await
            .unwrap();

        let report = manager.health_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].operation, "alpha");
        assert_eq!(report[1].state, CircuitState::Open);

        assert!(manager.reset("op"));
        assert!(!manager.reset("missing"));
        assert_eq!(manager.state("op"), Some(CircuitState::Closed));
    }
}
