// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived per-user conversation state: the pending confirmation (a
//! drafted reservation awaiting yes/no) and the just-confirmed cooldown flag.
//!
//! Both tables hold at most one row per user and are written with
//! `ON CONFLICT(user_id) DO UPDATE`, so concurrent writers for the same user
//! resolve as last-write-wins. Expiry is compared as text, which works
//! because timestamps use a fixed-width UTC format.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cowork_core::clock::{format_timestamp, parse_timestamp};
use cowork_core::{Clock, CoworkError, ReservationDraft};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::{Database, map_tr_err};

/// A drafted reservation awaiting an explicit yes/no.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
    pub user_id: String,
    pub draft: ReservationDraft,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The cooldown flag as seen at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JustConfirmedState {
    pub is_active: bool,
    pub until: Option<DateTime<Utc>>,
    pub last_reservation_id: Option<String>,
}

impl JustConfirmedState {
    fn inactive(last_reservation_id: Option<String>) -> Self {
        Self {
            is_active: false,
            until: None,
            last_reservation_id,
        }
    }
}

/// Store for pending confirmations and cooldown flags.
#[derive(Debug, Clone)]
pub struct ReservationStateStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ReservationStateStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Upserts the user's pending confirmation, expiring `ttl_minutes` from
    /// now. Globally expired rows are swept first.
    pub async fn set_pending_confirmation(
        &self,
        user_id: &str,
        draft: &ReservationDraft,
        ttl_minutes: i64,
    ) -> Result<PendingConfirmation, CoworkError> {
        if ttl_minutes <= 0 {
            return Err(CoworkError::Validation(format!(
                "pending confirmation TTL must be positive, got {ttl_minutes}"
            )));
        }
        let payload = serde_json::to_string(draft)
            .map_err(|e| CoworkError::Validation(format!("draft is not serializable: {e}")))?;
        let created_at = self.now();
        let expires_at = created_at + Duration::minutes(ttl_minutes);

        let user = user_id.to_string();
        let now_s = format_timestamp(created_at);
        let expires_s = format_timestamp(expires_at);
        let swept = self
            .db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let swept = tx.execute(
                    "DELETE FROM pending_confirmations WHERE expires_at <= ?1",
                    params![now_s],
                )?;
                tx.execute(
                    "INSERT INTO pending_confirmations (user_id, reservation_data, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         reservation_data = excluded.reservation_data,
                         created_at = excluded.created_at,
                         expires_at = excluded.expires_at",
                    params![user, payload, now_s, expires_s],
                )?;
                tx.commit()?;
                Ok(swept)
            })
            .await
            .map_err(map_tr_err)?;

        debug!(
            user_id,
            ttl_minutes,
            swept_expired = swept,
            "pending confirmation stored"
        );
        Ok(PendingConfirmation {
            user_id: user_id.to_string(),
            draft: draft.clone(),
            created_at,
            expires_at,
        })
    }

    /// The user's pending confirmation, or `None` when absent, expired
    /// (the row is deleted) or unreadable.
    pub async fn get_pending_confirmation(
        &self,
        user_id: &str,
    ) -> Result<Option<PendingConfirmation>, CoworkError> {
        let user = user_id.to_string();
        let now_s = format_timestamp(self.now());
        let row = self
            .db
            .connection()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT reservation_data, created_at, expires_at
                         FROM pending_confirmations WHERE user_id = ?1",
                        params![user],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    Some((_, _, ref expires_at)) if *expires_at <= now_s => {
                        // Only delete the row we saw; a concurrent upsert wins.
                        conn.execute(
                            "DELETE FROM pending_confirmations
                             WHERE user_id = ?1 AND expires_at = ?2",
                            params![user, expires_at],
                        )?;
                        Ok(None)
                    }
                    other => Ok(other),
                }
            })
            .await
            .map_err(map_tr_err)?;

        let Some((payload, created_at, expires_at)) = row else {
            return Ok(None);
        };

        let draft = match serde_json::from_str::<ReservationDraft>(&payload) {
            Ok(draft) => draft,
            Err(e) => {
                warn!(user_id, error = %e, "unreadable pending confirmation payload, ignoring");
                return Ok(None);
            }
        };
        match (parse_timestamp(&created_at), parse_timestamp(&expires_at)) {
            (Ok(created_at), Ok(expires_at)) => Ok(Some(PendingConfirmation {
                user_id: user_id.to_string(),
                draft,
                created_at,
                expires_at,
            })),
            _ => {
                warn!(user_id, "pending confirmation has malformed timestamps, ignoring");
                Ok(None)
            }
        }
    }

    /// Deletes the user's pending confirmation. Returns whether a row existed.
    pub async fn clear_pending_confirmation(&self, user_id: &str) -> Result<bool, CoworkError> {
        let user = user_id.to_string();
        let deleted = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM pending_confirmations WHERE user_id = ?1",
                    params![user],
                )
            })
            .await
            .map_err(map_tr_err)?;
        debug!(user_id, deleted, "pending confirmation cleared");
        Ok(deleted > 0)
    }

    /// Deletes every expired pending confirmation. Returns the number removed.
    pub async fn cleanup_expired_confirmations(&self) -> Result<usize, CoworkError> {
        let now_s = format_timestamp(self.now());
        let deleted = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM pending_confirmations WHERE expires_at <= ?1",
                    params![now_s],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if deleted > 0 {
            info!(deleted, "expired pending confirmations removed");
        }
        Ok(deleted)
    }

    /// Starts (or restarts) the user's cooldown, `cooldown_minutes` from now.
    pub async fn mark_just_confirmed(
        &self,
        user_id: &str,
        reservation_id: &str,
        cooldown_minutes: i64,
    ) -> Result<JustConfirmedState, CoworkError> {
        let now = self.now();
        let until = now + Duration::minutes(cooldown_minutes.max(0));
        let user = user_id.to_string();
        let reservation = reservation_id.to_string();
        let now_s = format_timestamp(now);
        let until_s = format_timestamp(until);
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO reservation_state (user_id, just_confirmed_until, last_reservation_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id) DO UPDATE SET
                         just_confirmed_until = excluded.just_confirmed_until,
                         last_reservation_id = excluded.last_reservation_id,
                         updated_at = excluded.updated_at",
                    params![user, until_s, reservation, now_s],
                )
            })
            .await
            .map_err(map_tr_err)?;

        debug!(user_id, reservation_id, cooldown_minutes, "cooldown started");
        Ok(JustConfirmedState {
            is_active: until > now,
            until: Some(until),
            last_reservation_id: Some(reservation_id.to_string()),
        })
    }

    /// Whether the user is in cooldown. An expired flag is cleared lazily
    /// (`until` set to NULL, row kept).
    pub async fn get_just_confirmed_state(
        &self,
        user_id: &str,
    ) -> Result<JustConfirmedState, CoworkError> {
        let user = user_id.to_string();
        let now_s = format_timestamp(self.now());
        let row = self
            .db
            .connection()
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT just_confirmed_until, last_reservation_id
                         FROM reservation_state WHERE user_id = ?1",
                        params![user],
                        |row| {
                            Ok((
                                row.get::<_, Option<String>>(0)?,
                                row.get::<_, Option<String>>(1)?,
                            ))
                        },
                    )
                    .optional()?;
                match row {
                    Some((Some(ref until), ref last)) if *until <= now_s => {
                        conn.execute(
                            "UPDATE reservation_state
                             SET just_confirmed_until = NULL, updated_at = ?3
                             WHERE user_id = ?1 AND just_confirmed_until = ?2",
                            params![user, until, now_s],
                        )?;
                        Ok(Some((None, last.clone())))
                    }
                    other => Ok(other),
                }
            })
            .await
            .map_err(map_tr_err)?;

        let Some((until, last_reservation_id)) = row else {
            return Ok(JustConfirmedState::inactive(None));
        };
        let Some(until) = until else {
            return Ok(JustConfirmedState::inactive(last_reservation_id));
        };
        match parse_timestamp(&until) {
            Ok(until) => Ok(JustConfirmedState {
                is_active: true,
                until: Some(until),
                last_reservation_id,
            }),
            Err(e) => {
                warn!(user_id, error = %e, "malformed cooldown timestamp, treating as inactive");
                Ok(JustConfirmedState::inactive(last_reservation_id))
            }
        }
    }

    /// Ends the user's cooldown now. Returns whether an active flag was cleared.
    pub async fn clear_just_confirmed(&self, user_id: &str) -> Result<bool, CoworkError> {
        let user = user_id.to_string();
        let now_s = format_timestamp(self.now());
        let cleared = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE reservation_state
                     SET just_confirmed_until = NULL, updated_at = ?2
                     WHERE user_id = ?1 AND just_confirmed_until IS NOT NULL",
                    params![user, now_s],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(cleared > 0)
    }

    /// Clears every expired cooldown flag. Returns the number cleared.
    pub async fn cleanup_just_confirmed_flags(&self) -> Result<usize, CoworkError> {
        let now_s = format_timestamp(self.now());
        let cleared = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE reservation_state
                     SET just_confirmed_until = NULL, updated_at = ?1
                     WHERE just_confirmed_until IS NOT NULL AND just_confirmed_until <= ?1",
                    params![now_s],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if cleared > 0 {
            info!(cleared, "expired cooldown flags cleared");
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use cowork_core::{ManualClock, ServiceType};
    use tempfile::tempdir;

    struct Fixture {
        store: ReservationStateStore,
        clock: ManualClock,
        db: Database,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("state.db").to_str().unwrap())
            .await
            .unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 11, 17, 13, 0, 0).unwrap());
        let store = ReservationStateStore::new(db.clone(), Arc::new(clock.clone()));
        Fixture {
            store,
            clock,
            db,
            _dir: dir,
        }
    }

    fn draft(user: &str) -> ReservationDraft {
        let mut draft = ReservationDraft::new(
            user,
            ServiceType::Desk,
            NaiveDate::from_ymd_opt(2025, 11, 18).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            2.0,
        );
        draft.total_price = 8_000.0;
        draft.customer_email = Some("ana@example.com".into());
        draft
    }

    async fn raw_pending_rows(db: &Database) -> i64 {
        db.connection()
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM pending_confirmations", [], |r| r.get(0))
            })
            .await
            .map_err(map_tr_err)
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_returns_exact_payload() {
        let f = setup().await;
        let stored = f
            .store
            .set_pending_confirmation("u1", &draft("u1"), 30)
            .await
            .unwrap();
        assert_eq!(stored.expires_at - stored.created_at, Duration::minutes(30));

        let loaded = f.store.get_pending_confirmation("u1").await.unwrap().unwrap();
        assert_eq!(loaded.draft, draft("u1"));
        assert_eq!(loaded, stored);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_user() {
        let f = setup().await;
        f.store
            .set_pending_confirmation("u1", &draft("u1"), 30)
            .await
            .unwrap();
        let mut changed = draft("u1");
        changed.duration_hours = 3.0;
        f.store
            .set_pending_confirmation("u1", &changed, 30)
            .await
            .unwrap();

        assert_eq!(raw_pending_rows(&f.db).await, 1);
        let loaded = f.store.get_pending_confirmation("u1").await.unwrap().unwrap();
        assert_eq!(loaded.draft.duration_hours, 3.0);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn expired_pending_is_absent_and_deleted() {
        let f = setup().await;
        f.store
            .set_pending_confirmation("u1", &draft("u1"), 30)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(29));
        assert!(f.store.get_pending_confirmation("u1").await.unwrap().is_some());

        f.clock.advance(Duration::minutes(1));
        assert!(f.store.get_pending_confirmation("u1").await.unwrap().is_none());
        assert_eq!(raw_pending_rows(&f.db).await, 0);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_sweeps_only_expired_rows() {
        let f = setup().await;
        f.store
            .set_pending_confirmation("old", &draft("old"), 5)
            .await
            .unwrap();
        f.store
            .set_pending_confirmation("new", &draft("new"), 60)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(10));

        assert_eq!(f.store.cleanup_expired_confirmations().await.unwrap(), 1);
        assert_eq!(f.store.cleanup_expired_confirmations().await.unwrap(), 0);
        assert!(f.store.get_pending_confirmation("new").await.unwrap().is_some());
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn set_sweeps_other_users_expired_rows() {
        let f = setup().await;
        f.store
            .set_pending_confirmation("old", &draft("old"), 5)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(6));
        f.store
            .set_pending_confirmation("u2", &draft("u2"), 30)
            .await
            .unwrap();
        assert_eq!(raw_pending_rows(&f.db).await, 1);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_payload_reads_as_absent() {
        let f = setup().await;
        f.store
            .set_pending_confirmation("u1", &draft("u1"), 30)
            .await
            .unwrap();
        f.db.connection()
            .call(|conn| {
                conn.execute(
                    "UPDATE pending_confirmations SET reservation_data = '{not json'",
                    [],
                )
            })
            .await
            .map_err(map_tr_err)
            .unwrap();

        assert!(f.store.get_pending_confirmation("u1").await.unwrap().is_none());
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn clear_pending_reports_existence() {
        let f = setup().await;
        assert!(!f.store.clear_pending_confirmation("u1").await.unwrap());
        f.store
            .set_pending_confirmation("u1", &draft("u1"), 30)
            .await
            .unwrap();
        assert!(f.store.clear_pending_confirmation("u1").await.unwrap());
        assert!(f.store.get_pending_confirmation("u1").await.unwrap().is_none());
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn non_positive_ttl_is_rejected() {
        let f = setup().await;
        let err = f
            .store
            .set_pending_confirmation("u1", &draft("u1"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CoworkError::Validation(_)));
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cooldown_active_for_ten_minutes_then_lazily_cleared() {
        let f = setup().await;
        f.store.mark_just_confirmed("u1", "res-1", 10).await.unwrap();

        f.clock.advance(Duration::minutes(9));
        let state = f.store.get_just_confirmed_state("u1").await.unwrap();
        assert!(state.is_active);
        assert_eq!(state.last_reservation_id.as_deref(), Some("res-1"));

        f.clock.advance(Duration::minutes(1));
        let state = f.store.get_just_confirmed_state("u1").await.unwrap();
        assert!(!state.is_active);
        assert!(state.until.is_none());
        assert_eq!(state.last_reservation_id.as_deref(), Some("res-1"));

        let until: Option<String> = f
            .db
            .connection()
            .call(|conn| {
                conn.query_row(
                    "SELECT just_confirmed_until FROM reservation_state WHERE user_id = 'u1'",
                    [],
                    |r| r.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
            .unwrap();
        assert!(until.is_none());
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_user_has_no_cooldown() {
        let f = setup().await;
        let state = f.store.get_just_confirmed_state("nobody").await.unwrap();
        assert_eq!(state, JustConfirmedState::inactive(None));
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn explicit_and_bulk_cooldown_clearing() {
        let f = setup().await;
        f.store.mark_just_confirmed("a", "r-a", 10).await.unwrap();
        f.store.mark_just_confirmed("b", "r-b", 10).await.unwrap();
        f.store.mark_just_confirmed("c", "r-c", 60).await.unwrap();

        assert!(f.store.clear_just_confirmed("a").await.unwrap());
        assert!(!f.store.clear_just_confirmed("a").await.unwrap());
        assert!(!f.store.get_just_confirmed_state("a").await.unwrap().is_active);

        f.clock.advance(Duration::minutes(15));
        assert_eq!(f.store.cleanup_just_confirmed_flags().await.unwrap(), 1);
        assert!(f.store.get_just_confirmed_state("c").await.unwrap().is_active);
        f.db.close().await.unwrap();
    }

    #[tokio::test]
    async fn remarking_extends_the_cooldown() {
        let f = setup().await;
        f.store.mark_just_confirmed("u1", "r1", 10).await.unwrap();
        f.clock.advance(Duration::minutes(8));
        f.store.mark_just_confirmed("u1", "r2", 10).await.unwrap();
        f.clock.advance(Duration::minutes(8));
        let state = f.store.get_just_confirmed_state("u1").await.unwrap();
        assert!(state.is_active);
        assert_eq!(state.last_reservation_id.as_deref(), Some("r2"));
        f.db.close().await.unwrap();
    }
}
