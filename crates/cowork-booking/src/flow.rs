// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The yes/no confirmation exchange that gates reservation creation.
//!
//! A drafted reservation is parked as a pending confirmation; the user's
//! next message either confirms it (re-check, persist, cooldown, notify),
//! cancels it, or asks for clarification. Outcomes are values rather than
//! errors so the conversational layer can always produce a reply.

use std::sync::Arc;
use std::time::Duration;

use cowork_config::ConfirmationConfig;
use cowork_core::{
    AlternativeSlot, ConflictReason, CoworkError, Notification, NotificationChannel,
    NotificationReceipt, NotificationSender, Reservation, ReservationDraft, ReservationStatus,
};
use cowork_resilience::{QueueTask, ResilienceHub, TaskHandle};
use cowork_storage::{PendingConfirmation, ReservationStateStore};
use serde::Serialize;
use strum::Display;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::availability::AvailabilityEngine;
use crate::classifier::{ConfirmationClassifier, Verdict};

/// Queue that carries post-confirmation notifications.
pub const NOTIFICATION_QUEUE: &str = "notifications";

/// Who is replying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }
}

/// Coarse failure category for [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FlowErrorKind {
    Validation,
    Storage,
    Integration,
    Internal,
}

/// A failure the conversational layer can turn into a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowError {
    pub kind: FlowErrorKind,
    pub message: String,
}

impl From<&CoworkError> for FlowError {
    fn from(err: &CoworkError) -> Self {
        let kind = match err {
            CoworkError::Validation(_)
            | CoworkError::Config(_)
            | CoworkError::AvailabilityConflict { .. } => FlowErrorKind::Validation,
            CoworkError::Storage { .. } | CoworkError::PersistenceConflict(_) => {
                FlowErrorKind::Storage
            }
            CoworkError::CircuitOpen { .. }
            | CoworkError::TransientIntegration { .. }
            | CoworkError::Integration { .. }
            | CoworkError::Timeout { .. } => FlowErrorKind::Integration,
            CoworkError::Internal(_) => FlowErrorKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Delivery state of one notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent { external_id: Option<String> },
    NotSent { reason: String },
    /// Still being delivered in the background; failures are only logged.
    Queued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
}

/// Result of processing one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    /// Nothing was awaiting confirmation for this user.
    NoPending,
    Confirmed {
        reservation: Reservation,
        notifications: Vec<NotificationReport>,
    },
    Cancelled,
    /// The reply was neither yes nor no; the draft stays pending.
    AwaitingClarification { draft: ReservationDraft },
    /// The slot was taken since the draft was made; the draft stays pending.
    Conflict {
        reason: ConflictReason,
        alternatives: Vec<AlternativeSlot>,
    },
    Failed { error: FlowError },
}

impl ConfirmationOutcome {
    /// True for a confirmation whose notifications did not all go out.
    pub fn notifications_degraded(&self) -> bool {
        match self {
            ConfirmationOutcome::Confirmed { notifications, .. } => notifications
                .iter()
                .any(|n| matches!(n.status, NotificationStatus::NotSent { .. })),
            _ => false,
        }
    }

    fn failed(err: &CoworkError) -> Self {
        ConfirmationOutcome::Failed {
            error: FlowError::from(err),
        }
    }
}

/// Drives pending confirmations to a reservation, a cancellation or a
/// clarification request.
pub struct ConfirmationFlow {
    engine: Arc<AvailabilityEngine>,
    state: ReservationStateStore,
    hub: ResilienceHub,
    classifier: ConfirmationClassifier,
    senders: Vec<Arc<dyn NotificationSender>>,
    config: ConfirmationConfig,
}

impl std::fmt::Debug for ConfirmationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationFlow")
            .field("senders", &self.senders.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConfirmationFlow {
    pub fn new(
        engine: Arc<AvailabilityEngine>,
        state: ReservationStateStore,
        hub: ResilienceHub,
        config: ConfirmationConfig,
    ) -> Self {
        Self {
            engine,
            state,
            hub,
            classifier: ConfirmationClassifier::default(),
            senders: Vec::new(),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: ConfirmationClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers a channel notified after each confirmation.
    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn classifier(&self) -> &ConfirmationClassifier {
        &self.classifier
    }

    pub fn engine(&self) -> &Arc<AvailabilityEngine> {
        &self.engine
    }

    pub fn state(&self) -> &ReservationStateStore {
        &self.state
    }

    /// Checks the draft and, when the slot is free, parks it as the user's
    /// pending confirmation. An unavailable slot is returned as
    /// [`CoworkError::AvailabilityConflict`].
    pub async fn begin_confirmation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<PendingConfirmation, CoworkError> {
        draft.validate()?;
        let check = self
            .engine
            .check_availability(
                draft.date,
                draft.start_time,
                draft.duration_hours,
                draft.service_type,
            )
            .await?;
        if let Some(conflict) = check.conflict() {
            return Err(conflict);
        }
        let pending = self
            .state
            .set_pending_confirmation(&draft.user_id, draft, self.config.pending_ttl_minutes)
            .await?;
        info!(
            user_id = %draft.user_id,
            service = %draft.service_type,
            date = %draft.date,
            expires_at = %pending.expires_at,
            "awaiting confirmation"
        );
        Ok(pending)
    }

    /// Interprets `message` as the answer to the user's pending confirmation.
    pub async fn process_confirmation_response(
        &self,
        message: &str,
        ctx: &UserContext,
    ) -> ConfirmationOutcome {
        let pending = match self.state.get_pending_confirmation(&ctx.user_id).await {
            Ok(Some(pending)) => pending,
            Ok(None) => return ConfirmationOutcome::NoPending,
            Err(e) => {
                error!(user_id = %ctx.user_id, error = %e, "failed to load pending confirmation");
                return ConfirmationOutcome::failed(&e);
            }
        };

        let verdict = self.classifier.classify(message);
        debug!(user_id = %ctx.user_id, %verdict, "confirmation reply classified");
        match verdict {
            Verdict::Positive => self.confirm(pending, ctx).await,
            Verdict::Negative => match self.state.clear_pending_confirmation(&ctx.user_id).await {
                Ok(_) => {
                    info!(user_id = %ctx.user_id, "pending reservation declined");
                    ConfirmationOutcome::Cancelled
                }
                Err(e) => {
                    error!(user_id = %ctx.user_id, error = %e, "failed to clear declined confirmation");
                    ConfirmationOutcome::failed(&e)
                }
            },
            Verdict::Ambiguous => ConfirmationOutcome::AwaitingClarification {
                draft: pending.draft,
            },
        }
    }

    /// Whether the user confirmed a booking within the cooldown window.
    pub async fn is_in_cooldown(&self, user_id: &str) -> Result<bool, CoworkError> {
        Ok(self.state.get_just_confirmed_state(user_id).await?.is_active)
    }

    async fn confirm(&self, pending: PendingConfirmation, ctx: &UserContext) -> ConfirmationOutcome {
        let mut draft = pending.draft;
        draft.status = ReservationStatus::Confirmed;
        if draft.customer_name.is_none() {
            draft.customer_name = ctx.customer_name.clone();
        }
        if draft.customer_email.is_none() {
            draft.customer_email = ctx.customer_email.clone();
        }

        let recheck = self
            .engine
            .check_availability(
                draft.date,
                draft.start_time,
                draft.duration_hours,
                draft.service_type,
            )
            .await;
        match recheck {
            Ok(result) => {
                if let Some(reason) = result.reason {
                    info!(
                        user_id = %ctx.user_id,
                        date = %draft.date,
                        start = %draft.start_time.format("%H:%M"),
                        %reason,
                        "slot no longer available at confirmation"
                    );
                    return ConfirmationOutcome::Conflict {
                        reason,
                        alternatives: result.alternatives,
                    };
                }
            }
            Err(e) => {
                error!(user_id = %ctx.user_id, error = %e, "availability re-check failed");
                return ConfirmationOutcome::failed(&e);
            }
        }

        let reservation = match self.engine.create_reservation(&draft).await {
            Ok(reservation) => reservation,
            Err(CoworkError::AvailabilityConflict {
                reason,
                alternatives,
            }) => {
                return ConfirmationOutcome::Conflict {
                    reason,
                    alternatives,
                };
            }
            Err(e) => {
                error!(user_id = %ctx.user_id, error = %e, "failed to persist confirmed reservation");
                return ConfirmationOutcome::failed(&e);
            }
        };

        if let Err(e) = self.state.clear_pending_confirmation(&ctx.user_id).await {
            warn!(
                user_id = %ctx.user_id,
                reservation_id = %reservation.id,
                error = %e,
                "reservation persisted but pending confirmation was not cleared"
            );
        }
        if let Err(e) = self
            .state
            .mark_just_confirmed(&ctx.user_id, &reservation.id, self.config.cooldown_minutes)
            .await
        {
            warn!(
                user_id = %ctx.user_id,
                reservation_id = %reservation.id,
                error = %e,
                "reservation persisted but cooldown flag was not set"
            );
        }

        let notification = Notification {
            reservation: reservation.clone(),
            customer_name: draft.customer_name.clone(),
            customer_email: draft.customer_email.clone(),
        };
        let notifications = self.notify(notification).await;
        info!(
            user_id = %ctx.user_id,
            reservation_id = %reservation.id,
            notified = notifications.len(),
            "reservation confirmed"
        );
        ConfirmationOutcome::Confirmed {
            reservation,
            notifications,
        }
    }

    /// Enqueues one task per sender under circuit `notify:<channel>`.
    async fn notify(&self, notification: Notification) -> Vec<NotificationReport> {
        if self.senders.is_empty() {
            return Vec::new();
        }
        let queue = self.hub.queue(NOTIFICATION_QUEUE);
        let notification = Arc::new(notification);
        let handles: Vec<(NotificationChannel, TaskHandle<NotificationReceipt>)> = self
            .senders
            .iter()
            .map(|sender| {
                let channel = sender.channel();
                let sender = Arc::clone(sender);
                let payload = Arc::clone(&notification);
                let task = QueueTask::new(
                    format!("notify {channel} {}", notification.reservation.id),
                    format!("notify:{channel}"),
                    move || {
                        let sender = Arc::clone(&sender);
                        let payload = Arc::clone(&payload);
                        async move { sender.send(&payload).await }
                    },
                );
                (channel, queue.enqueue(task))
            })
            .collect();

        let reservation_id = notification.reservation.id.clone();
        let user_id = notification.reservation.user_id.clone();

        if !self.config.wait_for_notifications {
            let reports = handles
                .iter()
                .map(|(channel, _)| NotificationReport {
                    channel: *channel,
                    status: NotificationStatus::Queued,
                })
                .collect();
            log_late_deliveries(handles, reservation_id, user_id);
            return reports;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.notification_wait_ms);
        let settled = futures::future::join_all(handles.into_iter().map(
            |(channel, mut handle)| async move {
                let result = tokio::time::timeout_at(deadline, &mut handle).await.ok();
                (channel, handle, result)
            },
        ))
        .await;

        let mut reports = Vec::with_capacity(settled.len());
        let mut late = Vec::new();
        for (channel, handle, result) in settled {
            let status = match result {
                Some(Ok(receipt)) => NotificationStatus::Sent {
                    external_id: receipt.external_id,
                },
                Some(Err(e)) => {
                    warn!(
                        %channel,
                        %reservation_id,
                        %user_id,
                        error = %e,
                        "notification not delivered, reservation stands"
                    );
                    NotificationStatus::NotSent {
                        reason: not_sent_reason(&e),
                    }
                }
                None => {
                    debug!(%channel, %reservation_id, "notification still in flight, not waiting");
                    late.push((channel, handle));
                    NotificationStatus::Queued
                }
            };
            reports.push(NotificationReport { channel, status });
        }
        if !late.is_empty() {
            log_late_deliveries(late, reservation_id, user_id);
        }
        reports
    }
}

/// Follows queued deliveries in the background and logs the ones that fail.
fn log_late_deliveries(
    handles: Vec<(NotificationChannel, TaskHandle<NotificationReceipt>)>,
    reservation_id: String,
    user_id: String,
) {
    tokio::spawn(async move {
        for (channel, handle) in handles {
            if let Err(e) = handle.await {
                warn!(
                    %channel,
                    %reservation_id,
                    %user_id,
                    error = %e,
                    "notification not delivered"
                );
            }
        }
    });
}

fn not_sent_reason(err: &CoworkError) -> String {
    match err {
        CoworkError::CircuitOpen { .. } => "service temporarily unavailable".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_only_when_a_channel_was_not_sent() {
        let reservation = Reservation {
            id: "r1".into(),
            user_id: "u1".into(),
            service_type: cowork_core::ServiceType::Desk,
            date: chrono::NaiveDate::from_ymd_opt(2025, 11, 18).unwrap(),
            start_time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            duration_hours: 1.0,
            guest_count: 1,
            total_price: 0.0,
            was_free: true,
            status: ReservationStatus::Confirmed,
            payment_status: cowork_core::PaymentStatus::Waived,
            payment_data: None,
            created_at: chrono::Utc::now(),
            confirmed_at: None,
        };
        let outcome = |status| ConfirmationOutcome::Confirmed {
            reservation: reservation.clone(),
            notifications: vec![
                NotificationReport {
                    channel: NotificationChannel::Email,
                    status: NotificationStatus::Sent { external_id: None },
                },
                NotificationReport {
                    channel: NotificationChannel::Calendar,
                    status,
                },
            ],
        };
        assert!(!outcome(NotificationStatus::Queued).notifications_degraded());
        assert!(
            outcome(NotificationStatus::NotSent {
                reason: "x".into()
            })
            .notifications_degraded()
        );
        assert!(!ConfirmationOutcome::Cancelled.notifications_degraded());
    }

    #[test]
    fn flow_error_kinds() {
        let open = CoworkError::CircuitOpen {
            circuit: "notify:email".into(),
            retry_in: None,
        };
        assert_eq!(FlowError::from(&open).kind, FlowErrorKind::Integration);
        assert_eq!(not_sent_reason(&open), "service temporarily unavailable");
        assert_eq!(
            FlowError::from(&CoworkError::Validation("x".into())).kind,
            FlowErrorKind::Validation
        );
        assert_eq!(
            FlowError::from(&CoworkError::Internal("x".into())).kind,
            FlowErrorKind::Internal
        );
    }
}
