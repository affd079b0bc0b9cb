// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end reservation flows.
//!
//! `TestHarness` assembles the whole core (temp SQLite database, availability
//! engine, state store, resilience hub and confirmation flow) around a
//! [`ManualClock`] so TTLs and cooldowns can be driven from tests.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use cowork_booking::{AvailabilityEngine, ConfirmationFlow, ConfirmationOutcome, UserContext};
use cowork_config::{CoworkConfig, StorageConfig};
use cowork_core::{
    Clock, CoworkError, ManualClock, NotificationSender, ReservationDraft, ServiceType,
};
use cowork_resilience::ResilienceHub;
use cowork_storage::{Database, PendingConfirmation, ReservationStateStore, SqliteReservationStore};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: CoworkConfig,
    start: DateTime<Utc>,
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = CoworkConfig::default();
        // Keep retries fast; breaker thresholds stay at their defaults.
        config.resilience.dispatcher.backoff_base_ms = 1;
        config.resilience.dispatcher.timeout_ms = 1_000;
        Self {
            config,
            // Monday 2025-11-17, 10:00 at the default UTC-03:00 offset.
            start: Utc
                .with_ymd_and_hms(2025, 11, 17, 13, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            senders: Vec::new(),
        }
    }

    /// Adjust the configuration before the stack is built.
    pub fn with_config(mut self, adjust: impl FnOnce(&mut CoworkConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Start the manual clock at `start` instead of the default Monday morning.
    pub fn with_clock_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    /// Register a notification sender on the confirmation flow.
    pub fn with_sender(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    /// Build the harness, creating the temp database and every subsystem.
    pub async fn build(self) -> Result<TestHarness, CoworkError> {
        let temp_dir = tempfile::TempDir::new().map_err(CoworkError::storage)?;
        let db_path = temp_dir.path().join("cowork-test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };

        let db = Database::open_with(&config.storage).await?;
        db.seed_capacity(&config.capacity).await?;

        let clock = ManualClock::new(self.start);
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(SqliteReservationStore::new(db.clone()));
        let engine = Arc::new(AvailabilityEngine::new(
            store.clone(),
            &config.business,
            config.capacity.clone(),
            Arc::clone(&shared_clock),
        )?);
        let state = ReservationStateStore::new(db.clone(), shared_clock);
        let hub = ResilienceHub::from_config(&config.resilience)?;

        let mut flow = ConfirmationFlow::new(
            Arc::clone(&engine),
            state.clone(),
            hub.clone(),
            config.confirmation.clone(),
        );
        for sender in self.senders {
            flow = flow.with_sender(sender);
        }

        Ok(TestHarness {
            config,
            clock,
            db,
            store,
            engine,
            state,
            hub,
            flow: Arc::new(flow),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete reservation core over temp storage.
pub struct TestHarness {
    /// Effective configuration (storage path points into the temp dir).
    pub config: CoworkConfig,
    /// The clock every component reads.
    pub clock: ManualClock,
    pub db: Database,
    pub store: Arc<SqliteReservationStore>,
    pub engine: Arc<AvailabilityEngine>,
    pub state: ReservationStateStore,
    pub hub: ResilienceHub,
    pub flow: Arc<ConfirmationFlow>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The business-local date `days` after today.
    pub fn local_date_in(&self, days: u64) -> NaiveDate {
        let today = self.engine.calendar().local_now(self.clock.now()).date();
        today.checked_add_days(Days::new(days)).unwrap_or(today)
    }

    /// A draft for `user_id` tomorrow at `hour:00`.
    pub fn draft_tomorrow(
        &self,
        user_id: &str,
        service: ServiceType,
        hour: u32,
        duration_hours: f64,
    ) -> ReservationDraft {
        let start = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
        ReservationDraft::new(user_id, service, self.local_date_in(1), start, duration_hours)
    }

    /// Parks `draft` as its user's pending confirmation.
    pub async fn propose(&self, draft: &ReservationDraft) -> Result<PendingConfirmation, CoworkError> {
        self.flow.begin_confirmation(draft).await
    }

    /// Sends `message` as `user_id`'s reply to their pending confirmation.
    pub async fn reply(&self, user_id: &str, message: &str) -> ConfirmationOutcome {
        self.flow
            .process_confirmation_response(message, &UserContext::new(user_id))
            .await
    }
}
