// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The resilience layer assembled from configuration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cowork_config::ResilienceConfig;
use cowork_core::CoworkError;
use serde::Serialize;
use tracing::info;

use crate::circuit_breaker::{CircuitState, CircuitStatus};
use crate::dispatcher::ExternalDispatcher;
use crate::queue::{QueueStats, TaskQueue, TaskQueueRegistry};
use crate::registry::CircuitBreakerRegistry;

/// Breakers, dispatcher and queues, built once at startup and shared by
/// reference.
#[derive(Debug, Clone)]
pub struct ResilienceHub {
    breakers: Arc<CircuitBreakerRegistry>,
    dispatcher: Arc<ExternalDispatcher>,
    queues: Arc<TaskQueueRegistry>,
}

/// Status surface for health-check endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceHealth {
    pub generated_at: DateTime<Utc>,
    pub circuits: Vec<CircuitStatus>,
    pub queues: Vec<QueueStats>,
}

impl ResilienceHealth {
    /// Names of circuits that are not closed.
    pub fn degraded_circuits(&self) -> Vec<&str> {
        self.circuits
            .iter()
            .filter(|c| c.state != CircuitState::Closed)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn is_healthy(&self) -> bool {
        self.degraded_circuits().is_empty()
    }
}

impl ResilienceHub {
    pub fn from_config(config: &ResilienceConfig) -> Result<Self, CoworkError> {
        let breakers = Arc::new(CircuitBreakerRegistry::from_config(config));
        Self::with_breakers(breakers, config)
    }

    /// Builds the hub around an existing breaker registry (custom overrides).
    pub fn with_breakers(
        breakers: Arc<CircuitBreakerRegistry>,
        config: &ResilienceConfig,
    ) -> Result<Self, CoworkError> {
        let dispatcher = Arc::new(ExternalDispatcher::new(
            Arc::clone(&breakers),
            config.dispatcher.clone(),
        )?);
        let queues = Arc::new(TaskQueueRegistry::new(Arc::clone(&dispatcher), &config.queue));
        info!(
            timeout_ms = config.dispatcher.timeout_ms,
            max_retries = config.dispatcher.max_retries,
            queue_concurrency = config.queue.concurrency,
            "resilience layer ready"
        );
        Ok(Self {
            breakers,
            dispatcher,
            queues,
        })
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn dispatcher(&self) -> &Arc<ExternalDispatcher> {
        &self.dispatcher
    }

    pub fn queues(&self) -> &Arc<TaskQueueRegistry> {
        &self.queues
    }

    pub fn queue(&self, name: &str) -> TaskQueue {
        self.queues.queue(name)
    }

    pub fn health(&self) -> ResilienceHealth {
        ResilienceHealth {
            generated_at: Utc::now(),
            circuits: self.breakers.statuses(),
            queues: self.queues.stats(),
        }
    }
}
