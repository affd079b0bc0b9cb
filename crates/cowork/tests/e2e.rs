// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the confirmation pipeline.
//!
//! Each test builds an isolated TestHarness (temp SQLite, manual clock, mock
//! notifiers). Tests are independent and order-insensitive.

use std::sync::Arc;

use chrono::Duration;
use cowork_booking::{ConfirmationOutcome, NotificationStatus, UserContext};
use cowork_config::ResilienceConfig;
use cowork_core::{
    ConflictReason, CoworkError, NotificationChannel, ReservationStatus, ReservationStore,
    ServiceType,
};
use cowork_test_utils::{MockNotifier, TestHarness};

async fn harness_with_notifiers() -> (TestHarness, Arc<MockNotifier>, Arc<MockNotifier>) {
    let email = Arc::new(MockNotifier::new(NotificationChannel::Email));
    let calendar = Arc::new(MockNotifier::new(NotificationChannel::Calendar));
    let harness = TestHarness::builder()
        .with_sender(email.clone())
        .with_sender(calendar.clone())
        .build()
        .await
        .unwrap();
    (harness, email, calendar)
}

// ---- Positive path ----

#[tokio::test]
async fn yes_creates_reservation_clears_pending_and_starts_cooldown() {
    let (harness, email, calendar) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::MeetingRoom, 10, 2.0);
    harness.propose(&draft).await.unwrap();

    let ctx = UserContext::new("u1")
        .with_name("Ana")
        .with_email("ana@example.com");
    let outcome = harness.flow.process_confirmation_response("Sí!", &ctx).await;

    let ConfirmationOutcome::Confirmed {
        reservation,
        notifications,
    } = outcome
    else {
        panic!("expected confirmation, got {outcome:?}");
    };
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert!(reservation.confirmed_at.is_some());
    assert_eq!(notifications.len(), 2);
    assert!(
        notifications
            .iter()
            .all(|n| matches!(n.status, NotificationStatus::Sent { .. }))
    );

    let stored = harness.store.get_reservation(&reservation.id).await.unwrap();
    assert_eq!(stored.as_ref().map(|r| r.status), Some(ReservationStatus::Confirmed));
    assert!(harness.state.get_pending_confirmation("u1").await.unwrap().is_none());
    assert!(harness.flow.is_in_cooldown("u1").await.unwrap());

    let sent = email.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].customer_email.as_deref(), Some("ana@example.com"));
    assert_eq!(sent[0].reservation.id, reservation.id);
    assert_eq!(calendar.sent_count().await, 1);
}

#[tokio::test]
async fn cooldown_lapses_after_ten_minutes() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 9, 1.0);
    harness.propose(&draft).await.unwrap();
    assert!(matches!(
        harness.reply("u1", "ok").await,
        ConfirmationOutcome::Confirmed { .. }
    ));

    harness.clock.advance(Duration::minutes(9));
    assert!(harness.flow.is_in_cooldown("u1").await.unwrap());
    harness.clock.advance(Duration::minutes(1));
    assert!(!harness.flow.is_in_cooldown("u1").await.unwrap());
}

// ---- Negative and ambiguous replies ----

#[tokio::test]
async fn no_cancels_without_creating_a_reservation() {
    let (harness, email, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::PrivateOffice, 11, 1.0);
    harness.propose(&draft).await.unwrap();

    assert_eq!(harness.reply("u1", "no").await, ConfirmationOutcome::Cancelled);
    assert!(harness.state.get_pending_confirmation("u1").await.unwrap().is_none());
    assert!(
        harness
            .store
            .active_reservations(draft.date, None)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!harness.flow.is_in_cooldown("u1").await.unwrap());
    assert_eq!(email.sent_count().await, 0);
}

#[tokio::test]
async fn ambiguous_reply_keeps_the_draft_until_a_clear_answer() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 15, 1.5);
    harness.propose(&draft).await.unwrap();

    for message in ["tal vez", "no sé", "a qué hora era?"] {
        match harness.reply("u1", message).await {
            ConfirmationOutcome::AwaitingClarification { draft: kept } => assert_eq!(kept, draft),
            other => panic!("{message:?}: expected clarification, got {other:?}"),
        }
    }
    assert!(harness.state.get_pending_confirmation("u1").await.unwrap().is_some());
    assert!(matches!(
        harness.reply("u1", "dale 👍").await,
        ConfirmationOutcome::Confirmed { .. }
    ));
}

#[tokio::test]
async fn reply_without_pending_is_no_pending() {
    let (harness, _, _) = harness_with_notifiers().await;
    assert_eq!(harness.reply("stranger", "si").await, ConfirmationOutcome::NoPending);
}

#[tokio::test]
async fn expired_pending_is_treated_as_absent() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();
    harness.clock.advance(Duration::minutes(31));

    assert_eq!(harness.reply("u1", "si").await, ConfirmationOutcome::NoPending);
    assert!(
        harness
            .store
            .active_reservations(draft.date, None)
            .await
            .unwrap()
            .is_empty()
    );
}

// ---- Conflicts ----

#[tokio::test]
async fn proposing_a_taken_slot_returns_alternatives() {
    let (harness, _, _) = harness_with_notifiers().await;
    let first = harness.draft_tomorrow("u1", ServiceType::MeetingRoom, 10, 2.0);
    harness.engine.create_reservation(&first).await.unwrap();

    let second = harness.draft_tomorrow("u2", ServiceType::MeetingRoom, 11, 1.0);
    let err = harness.propose(&second).await.unwrap_err();
    assert!(matches!(err, CoworkError::AvailabilityConflict { .. }));
    assert!(!err.alternatives().is_empty());
    assert!(harness.state.get_pending_confirmation("u2").await.unwrap().is_none());
}

#[tokio::test]
async fn slot_taken_before_yes_reports_conflict_and_keeps_pending() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::MeetingRoom, 10, 2.0);
    harness.propose(&draft).await.unwrap();

    let rival = harness.draft_tomorrow("rival", ServiceType::MeetingRoom, 9, 2.0);
    harness.engine.create_reservation(&rival).await.unwrap();

    match harness.reply("u1", "si").await {
        ConfirmationOutcome::Conflict {
            reason,
            alternatives,
        } => {
            assert_eq!(
                reason,
                ConflictReason::CapacityReached {
                    occupied: 1,
                    capacity: 1
                }
            );
            assert!(!alternatives.is_empty());
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(harness.state.get_pending_confirmation("u1").await.unwrap().is_some());
    assert!(!harness.flow.is_in_cooldown("u1").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_yes_for_an_exclusive_slot_confirms_exactly_one() {
    let (harness, _, _) = harness_with_notifiers().await;
    let a = harness.draft_tomorrow("a", ServiceType::MeetingRoom, 14, 1.0);
    let b = harness.draft_tomorrow("b", ServiceType::MeetingRoom, 14, 1.0);
    harness.propose(&a).await.unwrap();
    harness.propose(&b).await.unwrap();

    let flow_a = Arc::clone(&harness.flow);
    let flow_b = Arc::clone(&harness.flow);
    let (first, second) = tokio::join!(
        tokio::spawn(async move {
            flow_a
                .process_confirmation_response("si", &UserContext::new("a"))
                .await
        }),
        tokio::spawn(async move {
            flow_b
                .process_confirmation_response("si", &UserContext::new("b"))
                .await
        }),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    let confirmed: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, ConfirmationOutcome::Confirmed { .. }))
        .collect();
    let conflicts: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            ConfirmationOutcome::Conflict { alternatives, .. } => Some(alternatives),
            _ => None,
        })
        .collect();
    assert_eq!(confirmed.len(), 1, "{outcomes:?}");
    assert_eq!(conflicts.len(), 1, "{outcomes:?}");
    assert!(!conflicts[0].is_empty());

    let rows = harness
        .store
        .active_reservations(a.date, Some(ServiceType::MeetingRoom))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

// ---- Notification degradation ----

#[tokio::test]
async fn failing_channel_degrades_but_keeps_the_reservation() {
    let email = Arc::new(MockNotifier::new(NotificationChannel::Email));
    let calendar = Arc::new(MockNotifier::failing(NotificationChannel::Calendar));
    let harness = TestHarness::builder()
        .with_sender(email.clone())
        .with_sender(calendar.clone())
        .build()
        .await
        .unwrap();
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();

    let outcome = harness.reply("u1", "confirmo").await;
    assert!(outcome.notifications_degraded());
    let ConfirmationOutcome::Confirmed {
        reservation,
        notifications,
    } = outcome
    else {
        panic!("expected confirmation");
    };
    let calendar_status = notifications
        .iter()
        .find(|n| n.channel == NotificationChannel::Calendar)
        .map(|n| n.status.clone());
    assert!(matches!(
        calendar_status,
        Some(NotificationStatus::NotSent { .. })
    ));
    // One attempt plus the configured retries.
    assert_eq!(calendar.attempts(), 3);
    assert_eq!(email.sent_count().await, 1);
    assert!(
        harness
            .store
            .get_reservation(&reservation.id)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn open_circuit_reports_service_unavailable() {
    let (harness, email, _) = harness_with_notifiers().await;
    harness.hub.breakers().get("notify:email").force_open();
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();

    let outcome = harness.reply("u1", "si").await;
    let ConfirmationOutcome::Confirmed { notifications, .. } = &outcome else {
        panic!("expected confirmation, got {outcome:?}");
    };
    let email_status = notifications
        .iter()
        .find(|n| n.channel == NotificationChannel::Email)
        .map(|n| n.status.clone());
    assert_eq!(
        email_status,
        Some(NotificationStatus::NotSent {
            reason: "service temporarily unavailable".into()
        })
    );
    assert_eq!(email.attempts(), 0);
}

#[tokio::test]
async fn transient_failure_is_retried_to_success() {
    let (harness, email, _) = harness_with_notifiers().await;
    email.fail_next(1);
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();

    let outcome = harness.reply("u1", "si").await;
    assert!(!outcome.notifications_degraded());
    assert_eq!(email.attempts(), 2);
    assert_eq!(email.sent_count().await, 1);
}

#[tokio::test]
async fn fire_and_forget_notifications_report_queued() {
    let email = Arc::new(MockNotifier::new(NotificationChannel::Email));
    let harness = TestHarness::builder()
        .with_config(|c| c.confirmation.wait_for_notifications = false)
        .with_sender(email.clone())
        .build()
        .await
        .unwrap();
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();

    let outcome = harness.reply("u1", "si").await;
    let ConfirmationOutcome::Confirmed { notifications, .. } = &outcome else {
        panic!("expected confirmation, got {outcome:?}");
    };
    assert_eq!(notifications[0].status, NotificationStatus::Queued);

    harness.hub.queues().wait_idle().await;
    assert_eq!(email.sent_count().await, 1);
}

#[tokio::test]
async fn slow_channel_does_not_hold_the_reply() {
    let email = Arc::new(MockNotifier::new(NotificationChannel::Email));
    let calendar = Arc::new(MockNotifier::stalled(
        NotificationChannel::Calendar,
        std::time::Duration::from_secs(60),
    ));
    let harness = TestHarness::builder()
        .with_config(|c| c.resilience = ResilienceConfig::default())
        .with_sender(email.clone())
        .with_sender(calendar.clone())
        .build()
        .await
        .unwrap();
    let draft = harness.draft_tomorrow("u1", ServiceType::MeetingRoom, 10, 1.0);
    harness.propose(&draft).await.unwrap();

    let started = std::time::Instant::now();
    let outcome = harness.reply("u1", "si").await;
    assert!(
        started.elapsed() < std::time::Duration::from_secs(4),
        "reply took {:?}",
        started.elapsed()
    );

    let ConfirmationOutcome::Confirmed { notifications, .. } = &outcome else {
        panic!("expected confirmation, got {outcome:?}");
    };
    let status_of = |channel: NotificationChannel| {
        notifications
            .iter()
            .find(|n| n.channel == channel)
            .map(|n| n.status.clone())
    };
    assert!(matches!(
        status_of(NotificationChannel::Email),
        Some(NotificationStatus::Sent { .. })
    ));
    assert_eq!(
        status_of(NotificationChannel::Calendar),
        Some(NotificationStatus::Queued)
    );
    assert!(!outcome.notifications_degraded());
    assert_eq!(calendar.attempts(), 1);
}

// ---- Operational surface ----

#[tokio::test]
async fn health_lists_notification_circuits_and_queue() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();
    harness.reply("u1", "si").await;

    let health = harness.hub.health();
    assert!(health.is_healthy());
    let names: Vec<_> = health.circuits.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"notify:email"));
    assert!(names.contains(&"notify:calendar"));
    assert!(health.queues.iter().any(|q| q.name == "notifications"));
}

#[tokio::test]
async fn sweep_removes_expired_state() {
    let (harness, _, _) = harness_with_notifiers().await;
    let draft = harness.draft_tomorrow("u1", ServiceType::Desk, 10, 1.0);
    harness.propose(&draft).await.unwrap();
    let other = harness.draft_tomorrow("u2", ServiceType::Desk, 12, 1.0);
    harness.propose(&other).await.unwrap();
    harness.reply("u2", "si").await;

    harness.clock.advance(Duration::minutes(45));
    assert_eq!(harness.state.cleanup_expired_confirmations().await.unwrap(), 1);
    assert_eq!(harness.state.cleanup_just_confirmed_flags().await.unwrap(), 1);
}
