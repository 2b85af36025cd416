//! Circuit breaker state machine for a single operation
//!
//! ```text
//! CLOSED --(failure_threshold consecutive failures)--> OPEN
//! OPEN --(recovery_timeout elapsed, next call admitted)--> HALF_OPEN
//! HALF_OPEN --(any failure)--> OPEN
//! HALF_OPEN --(success_threshold consecutive successes)--> CLOSED
//! ```
//!
//! Consecutive counters and the half-open admission count reset on every transition.
//! The breaker itself is not synchronized; the manager wraps each one in its own lock.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    /// Bonus added to the success rate when computing the health score
    fn health_bonus(&self) -> f64 {
        match self {
            Self::Closed => 10.0,
            Self::HalfOpen => 5.0,
            Self::Open => 0.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in CLOSED before opening
    pub failure_threshold: u32,

    /// Consecutive successes in HALF_OPEN before closing
    pub success_threshold: u32,

    /// Time since the last failure before an OPEN breaker admits a probe
    pub recovery_timeout_ms: u64,

    /// Calls admitted while HALF_OPEN
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_ms: 30_000,
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout_ms: u64) -> Self {
        Self {
            failure_threshold,
            recovery_timeout_ms,
            ..Default::default()
        }
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.half_open_max_calls = max_calls;
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    /// A HALF_OPEN breaker that admits fewer calls than it needs successes can never close
    pub fn validate(&self) -> Result<(), String> {
        if self.success_threshold == 0 {
            return Err("success_threshold must be at least 1".to_string());
        }

        if self.half_open_max_calls < self.success_threshold {
            return Err(format!(
                "half_open_max_calls ({}) must be at least success_threshold ({})",
                self.half_open_max_calls, self.success_threshold
            ));
        }

        Ok(())
    }
}

/// A state change, reported so callers can emit events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Why a call was not admitted
#[derive(Debug, Clone, PartialEq)]
pub struct CallRejected {
    pub state: CircuitState,

    /// Estimated time after which a call will be admitted again
    pub retry_at: DateTime<Utc>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    pub operation: String,
    pub state: CircuitState,
    pub health_score: f64,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_calls: u32,
    pub total_calls: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
    pub state_transitions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
    pub config: CircuitBreakerConfig,
}

/// Failure-isolation state machine for one operation
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    last_failure_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_rejections: u64,
    state_transitions: u64,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            operation: operation.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            last_failure_at: None,
            last_failure_time: None,
            last_error: None,
            total_calls: 0,
            total_successes: 0,
            total_failures: 0,
            total_rejections: 0,
            state_transitions: 0,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    /// Ask to admit one call.
    ///
    /// An OPEN breaker whose recovery timeout has elapsed moves to HALF_OPEN before
    /// admitting; the returned transition (if any) must be reported by the caller.
    pub fn try_acquire(&mut self) -> Result<Option<StateTransition>, CallRejected> {
        match self.state {
            CircuitState::Closed => {
                self.total_calls += 1;
                Ok(None)
            }
            CircuitState::Open => {
                if self.recovery_elapsed() {
                    let transition = self.transition_to(CircuitState::HalfOpen);
                    self.half_open_calls = 1;
                    self.total_calls += 1;
                    Ok(Some(transition))
                } else {
                    self.total_rejections += 1;
                    Err(self.rejection())
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    self.total_calls += 1;
                    Ok(None)
                } else {
                    self.total_rejections += 1;
                    Err(self.rejection())
                }
            }
        }
    }

    /// Hand back a HALF_OPEN admission whose outcome counts neither way (a client error)
    pub fn release_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.half_open_calls = self.half_open_calls.saturating_sub(1);
        }
    }

    /// Record a successful call
    pub fn record_success(&mut self) -> Option<StateTransition> {
        self.total_successes += 1;

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;

                if self.success_count >= self.config.success_threshold {
                    Some(self.transition_to(CircuitState::Closed))
                } else {
                    None
                }
            }
            // A call admitted before the breaker opened finished late
            CircuitState::Open => None,
        }
    }

    /// Record a breaker-triggering failure
    pub fn record_failure(&mut self, error: impl Into<String>) -> Option<StateTransition> {
        self.total_failures += 1;
        self.last_failure_at = Some(Instant::now());
        self.last_failure_time = Some(Utc::now());
        self.last_error = Some(error.into());

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;

                if self.failure_count >= self.config.failure_threshold {
                    Some(self.transition_to(CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => Some(self.transition_to(CircuitState::Open)),
            CircuitState::Open => None,
        }
    }

    /// Force the breaker back to CLOSED
    pub fn reset(&mut self) -> Option<StateTransition> {
        if self.state == CircuitState::Closed {
            self.failure_count = 0;
            self.success_count = 0;
            return None;
        }

        Some(self.transition_to(CircuitState::Closed))
    }

    /// Successes over decided calls; 1.0 before any call completes
    pub fn success_rate(&self) -> f64 {
        let decided = self.total_successes + self.total_failures;

        if decided == 0 {
            1.0
        } else {
            self.total_successes as f64 / decided as f64
        }
    }

    /// `min(100, success_rate * 100 + state bonus)`; reporting only
    pub fn health_score(&self) -> f64 {
        (self.success_rate() * 100.0 + self.state.health_bonus()).min(100.0)
    }

    /// When an OPEN breaker will admit its next probe
    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        if self.state != CircuitState::Open {
            return None;
        }

        let last_failure = self.last_failure_time.unwrap_or_else(Utc::now);
        let timeout = chrono::Duration::milliseconds(self.config.recovery_timeout_ms as i64);
        Some(last_failure + timeout)
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            operation: self.operation.clone(),
            state: self.state,
            health_score: self.health_score(),
            failure_count: self.failure_count,
            success_count: self.success_count,
            half_open_calls: self.half_open_calls,
            total_calls: self.total_calls,
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            total_rejections: self.total_rejections,
            state_transitions: self.state_transitions,
            last_failure_time: self.last_failure_time,
            last_error: self.last_error.clone(),
            retry_at: self.retry_at(),
            config: self.config.clone(),
        }
    }

    fn recovery_elapsed(&self) -> bool {
        match self.last_failure_at {
            Some(at) => at.elapsed() >= self.config.recovery_timeout(),
            None => true,
        }
    }

    fn rejection(&self) -> CallRejected {
        let retry_at = match self.state {
            CircuitState::Open => self.retry_at().unwrap_or_else(Utc::now),
            _ => Utc::now(),
        };

        CallRejected {
            state: self.state,
            retry_at,
        }
    }

    fn transition_to(&mut self, to: CircuitState) -> StateTransition {
        let from = self.state;
        self.state = to;
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_calls = 0;
        self.state_transitions += 1;

        StateTransition { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, recovery_timeout_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "op",
            CircuitBreakerConfig::new(failure_threshold, recovery_timeout_ms)
                .with_success_threshold(2)
                .with_half_open_max_calls(2),
        )
    }

    fn fail(cb: &mut CircuitBreaker) -> Option<StateTransition> {
        cb.try_acquire().unwrap();
        cb.record_failure("boom")
    }

    #[test]
    fn test_starts_closed() {
        let cb = breaker(3, 1000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.health_score(), 100.0);
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut cb = breaker(3, 60_000);

        assert!(fail(&mut cb).is_none());
        assert!(fail(&mut cb).is_none());
        let transition = fail(&mut cb).unwrap();

        assert_eq!(transition.from, CircuitState::Closed);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(cb.failure_count(), 0);

        let rejected = cb.try_acquire().unwrap_err();
        assert_eq!(rejected.state, CircuitState::Open);
        assert!(rejected.retry_at > Utc::now());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut cb = breaker(3, 60_000);

        fail(&mut cb);
        fail(&mut cb);
        cb.try_acquire().unwrap();
        cb.record_success();
        fail(&mut cb);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 1);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let mut cb = breaker(1, 20);
        fail(&mut cb);
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));

        let transition = cb.try_acquire().unwrap().unwrap();
        assert_eq!(transition.to, CircuitState::HalfOpen);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_closes_after_success_threshold() {
        let mut cb = breaker(1, 10);
        fail(&mut cb);
        std::thread::sleep(Duration::from_millis(20));

        cb.try_acquire().unwrap();
        assert!(cb.record_success().is_none());
        cb.try_acquire().unwrap();
        let transition = cb.record_success().unwrap();

        assert_eq!(transition.to, CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.success_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = breaker(1, 10);
        fail(&mut cb);
        std::thread::sleep(Duration::from_millis(20));

        cb.try_acquire().unwrap();
        let transition = cb.record_failure("still down").unwrap();

        assert_eq!(transition.from, CircuitState::HalfOpen);
        assert_eq!(transition.to, CircuitState::Open);
    }

    #[test]
    fn test_half_open_limits_admitted_calls() {
        let mut cb = breaker(1, 10);
        fail(&mut cb);
        std::thread::sleep(Duration::from_millis(20));

        assert!(cb.try_acquire().is_ok());
        assert!(cb.try_acquire().is_ok());
        let rejected = cb.try_acquire().unwrap_err();
        assert_eq!(rejected.state, CircuitState::HalfOpen);
    }

    #[test]
    fn test_released_probe_frees_half_open_slot() {
        let mut cb = breaker(1, 10);
        fail(&mut cb);
        std::thread::sleep(Duration::from_millis(20));

        for _ in 0..5 {
            cb.try_acquire().unwrap();
            cb.release_probe();
        }
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.try_acquire().unwrap();
        cb.record_success();
        cb.try_acquire().unwrap();
        let transition = cb.record_success().unwrap();
        assert_eq!(transition.to, CircuitState::Closed);
    }

    #[test]
    fn test_release_outside_half_open_is_noop() {
        let mut cb = breaker(3, 60_000);
        cb.try_acquire().unwrap();
        cb.release_probe();

        assert_eq!(cb.snapshot().half_open_calls, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let starved = CircuitBreakerConfig::default()
            .with_success_threshold(3)
            .with_half_open_max_calls(1);
        let err = starved.validate().unwrap_err();
        assert!(err.contains("half_open_max_calls (1)"));

        assert!(CircuitBreakerConfig::default()
            .with_success_threshold(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_health_score() {
        let mut cb = breaker(10, 1000);

        cb.try_acquire().unwrap();
        cb.record_success();
        fail(&mut cb);

        // 50% success rate + CLOSED bonus
        assert_eq!(cb.health_score(), 60.0);

        let mut open = breaker(1, 60_000);
        fail(&mut open);
        assert_eq!(open.health_score(), 0.0);
    }

    #[test]
    fn test_reset() {
        let mut cb = breaker(1, 60_000);
        fail(&mut cb);

        let transition = cb.reset().unwrap();
        assert_eq!(transition.to, CircuitState::Closed);
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_snapshot_counters() {
        let mut cb = breaker(2, 60_000);
        fail(&mut cb);
        fail(&mut cb);
        let _ = cb.try_acquire();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.total_calls, 2);
        assert_eq!(snapshot.total_failures, 2);
        assert_eq!(snapshot.total_rejections, 1);
        assert_eq!(snapshot.state_transitions, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
        assert!(snapshot.retry_at.is_some());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&CircuitState::HalfOpen).unwrap(),
            "\"HALF_OPEN\""
        );
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
