// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience layer for outbound integrations (calendar, email, messaging,
//! AI completion).
//!
//! - [`CircuitBreaker`] tracks consecutive failures per integration.
//! - [`ExternalDispatcher`] adds hard timeouts and exponential backoff.
//! - [`TaskQueue`] defers work behind a concurrency cap.
//! - [`ResilienceHub`] wires them together from configuration and exposes
//!   the health surface.

pub mod circuit_breaker;
pub mod dispatcher;
pub mod hub;
pub mod queue;
pub mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use dispatcher::{ExternalDispatcher, HttpRequest, HttpResponse, RetryOptions};
pub use hub::{ResilienceHealth, ResilienceHub};
pub use queue::{QueueStats, QueueTask, TaskHandle, TaskQueue, TaskQueueRegistry};
pub use registry::CircuitBreakerRegistry;
