// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cowork reservation core.

use std::time::Duration;

use thiserror::Error;

use crate::types::{AlternativeSlot, ConflictReason};

/// The primary error type used across the reservation core.
#[derive(Debug, Error)]
pub enum CoworkError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed draft or request (missing field, invalid time range).
    /// Surfaced immediately, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested slot cannot be booked. Always carries the alternatives
    /// computed at the time of the rejection.
    #[error("slot unavailable: {reason}")]
    AvailabilityConflict {
        reason: ConflictReason,
        alternatives: Vec<AlternativeSlot>,
    },

    /// The storage layer refused an insert because a concurrent writer won
    /// the slot. Callers recompute availability instead of retrying the write.
    #[error("reservation conflict: {0}")]
    PersistenceConflict(String),

    /// The named circuit is open; the breaker owns the retry schedule.
    #[error("circuit `{circuit}` is open")]
    CircuitOpen {
        circuit: String,
        retry_in: Option<Duration>,
    },

    /// Network, timeout or 5xx failure from a downstream integration.
    #[error("transient failure calling {integration}: {message}")]
    TransientIntegration {
        integration: String,
        message: String,
    },

    /// A downstream integration rejected the request (4xx or SDK-level refusal).
    #[error("{integration} rejected the request: {message}")]
    Integration {
        integration: String,
        status: Option<u16>,
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoworkError {
    /// Wraps any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CoworkError::Storage {
            source: Box::new(err),
        }
    }

    /// True for failures worth retrying: transient integration errors and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoworkError::TransientIntegration { .. } | CoworkError::Timeout { .. }
        )
    }

    /// True when the failure says something about the health of the
    /// integration rather than about the request itself.
    ///
    /// Validation problems, booking conflicts and 4xx rejections are the
    /// caller's fault and do not trip a circuit breaker.
    pub fn counts_as_integration_failure(&self) -> bool {
        matches!(
            self,
            CoworkError::TransientIntegration { .. }
                | CoworkError::Timeout { .. }
                | CoworkError::Storage { .. }
                | CoworkError::Internal(_)
        )
    }

    /// Alternatives attached to an availability conflict, if any.
    pub fn alternatives(&self) -> &[AlternativeSlot] {
        match self {
            CoworkError::AvailabilityConflict { alternatives, .. } => alternatives,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(
            CoworkError::TransientIntegration {
                integration: "calendar".into(),
                message: "502".into(),
            }
            .is_transient()
        );
        assert!(
            CoworkError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(!CoworkError::Validation("x".into()).is_transient());
        assert!(
            !CoworkError::CircuitOpen {
                circuit: "c".into(),
                retry_in: None
            }
            .is_transient()
        );
    }

    #[test]
    fn client_errors_do_not_trip_breakers() {
        let rejected = CoworkError::Integration {
            integration: "email".into(),
            status: Some(400),
            message: "bad address".into(),
        };
        assert!(!rejected.counts_as_integration_failure());
        assert!(!CoworkError::PersistenceConflict("race".into()).counts_as_integration_failure());
        assert!(CoworkError::Internal("boom".into()).counts_as_integration_failure());
    }

    #[test]
    fn alternatives_only_on_conflicts() {
        assert!(CoworkError::Internal("x".into()).alternatives().is_empty());
    }
}
