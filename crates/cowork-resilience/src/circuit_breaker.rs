// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-integration circuit breaker.
//!
//! Simple consecutive-failure policy with three states: Closed (calls flow),
//! Open (calls fail fast until the reset timeout elapses) and HalfOpen (a
//! bounded number of trial calls probe whether the integration recovered).
//! State lives in memory only and resets on restart.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cowork_config::BreakerConfig;
use cowork_core::CoworkError;
use serde::Serialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Operational mode of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast until the reset timeout elapses.
    Open,
    /// Probing recovery with a limited number of trial calls.
    HalfOpen,
}

/// Thresholds for a single breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive successes in HalfOpen that close it again.
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a trial call.
    pub reset_timeout: Duration,
    /// Trial calls allowed in flight while HalfOpen.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
        }
    }
}

/// Read-only snapshot for health checks.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub half_open_successes: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub next_attempt: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    /// Bumped on every transition so stale trial guards leave the new state alone.
    generation: u64,
    next_attempt: Option<Instant>,
    opened_at: Option<DateTime<Utc>>,
    next_attempt_wall: Option<DateTime<Utc>>,
    total: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            generation: 0,
            next_attempt: None,
            opened_at: None,
            next_attempt_wall: None,
            total: 0,
            successes: 0,
            failures: 0,
            rejected: 0,
        }
    }
}

/// Circuit breaker guarding one integration.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// An admitted call. Trial calls release their HalfOpen slot on drop, so a
/// cancelled future cannot wedge the breaker.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.trial {
            return;
        }
        let mut inner = self.breaker.lock();
        if inner.generation == self.generation && inner.half_open_in_flight > 0 {
            inner.half_open_in_flight -= 1;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            circuit = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout_secs = config.reset_timeout.as_secs(),
            "circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without applying any pending Open -> HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Runs `operation` through the breaker.
    ///
    /// When the circuit is open and the reset timeout has not elapsed, returns
    /// [`CoworkError::CircuitOpen`] without invoking `operation`.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, CoworkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoworkError>>,
    {
        let admission = self.admit()?;
        let result = operation().await;
        match &result {
            Ok(_) => self.on_success(&admission),
            Err(e) if e.counts_as_integration_failure() => self.on_failure(&admission, e),
            // Caller-side errors (validation, 4xx, conflicts) say nothing
            // about the integration's health.
            Err(_) => self.on_success(&admission),
        }
        result
    }

    /// Like [`execute`](Self::execute), but returns `fallback()` instead of a
    /// `CircuitOpen` error when the call is rejected. Errors from `operation`
    /// itself still propagate.
    pub async fn execute_with_fallback<T, F, Fut, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CoworkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoworkError>>,
        FB: FnOnce() -> T,
    {
        match self.execute(operation).await {
            Err(CoworkError::CircuitOpen { .. }) => Ok(fallback()),
            other => other,
        }
    }

    /// Snapshot of state and counters.
    pub fn status(&self) -> CircuitStatus {
        let inner = self.lock();
        CircuitStatus {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            half_open_successes: inner.half_open_successes,
            opened_at: inner.opened_at,
            next_attempt: inner.next_attempt_wall,
            total_requests: inner.total,
            successful_requests: inner.successes,
            failed_requests: inner.failures,
            rejected_requests: inner.rejected,
        }
    }

    /// Opens the circuit immediately (operator action).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        self.open(&mut inner);
        warn!(circuit = %self.name, "circuit forced open");
    }

    /// Closes the circuit and clears counters (operator action, tests).
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.generation + 1;
        *inner = Inner::new();
        inner.generation = generation;
        info!(circuit = %self.name, "circuit reset");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self) -> Result<Admission<'_>, CoworkError> {
        let mut inner = self.lock();
        inner.total += 1;

        if inner.state == CircuitState::Open {
            let now = Instant::now();
            match inner.next_attempt {
                Some(at) if now < at => {
                    inner.rejected += 1;
                    debug!(circuit = %self.name, "call rejected, circuit open");
                    return Err(CoworkError::CircuitOpen {
                        circuit: self.name.clone(),
                        retry_in: Some(at - now),
                    });
                }
                _ => {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.half_open_in_flight = 0;
                    inner.generation += 1;
                    info!(circuit = %self.name, "circuit half-open, allowing trial calls");
                }
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_in_flight >= self.config.half_open_max_calls {
                inner.rejected += 1;
                debug!(circuit = %self.name, "call rejected, half-open trial slots taken");
                return Err(CoworkError::CircuitOpen {
                    circuit: self.name.clone(),
                    retry_in: None,
                });
            }
            inner.half_open_in_flight += 1;
            return Ok(Admission {
                breaker: self,
                generation: inner.generation,
                trial: true,
            });
        }

        Ok(Admission {
            breaker: self,
            generation: inner.generation,
            trial: false,
        })
    }

    fn on_success(&self, admission: &Admission<'_>) {
        let mut inner = self.lock();
        inner.successes += 1;
        if inner.generation != admission.generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    self.close(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, admission: &Admission<'_>, error: &CoworkError) {
        let mut inner = self.lock();
        inner.failures += 1;
        if inner.generation != admission.generation {
            return;
        }
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                debug!(
                    circuit = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    error = %error,
                    "call failed"
                );
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, error = %error, "trial call failed");
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        let opened_at = Utc::now();
        inner.state = CircuitState::Open;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        inner.generation += 1;
        inner.next_attempt = Some(Instant::now() + self.config.reset_timeout);
        inner.opened_at = Some(opened_at);
        inner.next_attempt_wall = chrono::Duration::from_std(self.config.reset_timeout)
            .ok()
            .map(|d| opened_at + d);
        warn!(
            circuit = %self.name,
            consecutive_failures = inner.consecutive_failures,
            reset_timeout_secs = self.config.reset_timeout.as_secs(),
            "circuit opened"
        );
    }

    fn close(&self, inner: &mut Inner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.half_open_in_flight = 0;
        inner.generation += 1;
        inner.next_attempt = None;
        inner.opened_at = None;
        inner.next_attempt_wall = None;
        info!(circuit = %self.name, "circuit closed, integration recovered");
    }
}
