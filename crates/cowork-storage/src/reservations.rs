// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`ReservationStore`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use cowork_core::clock::{format_timestamp, parse_timestamp};
use cowork_core::{CoworkError, Reservation, ReservationStore, ServiceType};
use rusqlite::types::Type;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use tracing::debug;

use crate::database::{Database, map_tr_err};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

const COLUMNS: &str = "id, user_id, service_type, date, start_time, end_time, duration_hours, \
     guest_count, total_price, was_free, status, payment_status, payment_data, created_at, \
     confirmed_at";

/// Reservation rows in the `reservations` table.
#[derive(Debug, Clone)]
pub struct SqliteReservationStore {
    db: Database,
}

impl SqliteReservationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All reservations owned by `user_id`, newest date first.
    pub async fn reservations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Reservation>, CoworkError> {
        let user_id = user_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM reservations WHERE user_id = ?1
                     ORDER BY date DESC, start_time DESC"
                ))?;
                let rows = stmt
                    .query_map(params![user_id], row_to_reservation)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn parse_column<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|msg| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into()))
}

fn parse_enum<T: FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::fmt::Display,
{
    parse_column(row, idx, |s| T::from_str(s).map_err(|e| format!("`{s}`: {e}")))
}

fn row_to_reservation(row: &Row<'_>) -> rusqlite::Result<Reservation> {
    let payment_data: Option<String> = row.get(12)?;
    let payment_data = payment_data
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?;
    let confirmed_at: Option<String> = row.get(14)?;
    let confirmed_at = confirmed_at
        .map(|raw| parse_timestamp(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e)))?;

    Ok(Reservation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_type: parse_enum(row, 2)?,
        date: parse_column(row, 3, |s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| e.to_string())
        })?,
        start_time: parse_column(row, 4, parse_time)?,
        end_time: parse_column(row, 5, parse_time)?,
        duration_hours: row.get(6)?,
        guest_count: row.get(7)?,
        total_price: row.get(8)?,
        was_free: row.get(9)?,
        status: parse_enum(row, 10)?,
        payment_status: parse_enum(row, 11)?,
        payment_data,
        created_at: parse_column(row, 13, |s| parse_timestamp(s).map_err(|e| e.to_string()))?,
        confirmed_at,
    })
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(raw, TIME_FORMAT).map_err(|e| e.to_string())
}

fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn payment_json(reservation: &Reservation) -> Result<Option<String>, CoworkError> {
    reservation
        .payment_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| CoworkError::Validation(format!("payment data is not serializable: {e}")))
}

#[async_trait]
impl ReservationStore for SqliteReservationStore {
    async fn active_reservations(
        &self,
        date: NaiveDate,
        service_type: Option<ServiceType>,
    ) -> Result<Vec<Reservation>, CoworkError> {
        let date = date.format(DATE_FORMAT).to_string();
        let service = service_type.map(|s| s.to_string());
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM reservations
                     WHERE date = ?1 AND status <> 'cancelled'
                       AND (?2 IS NULL OR service_type = ?2)
                     ORDER BY start_time ASC, created_at ASC"
                ))?;
                let rows = stmt
                    .query_map(params![date, service], row_to_reservation)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_reservation(&self, id: &str) -> Result<Option<Reservation>, CoworkError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {COLUMNS} FROM reservations WHERE id = ?1"),
                    params![id],
                    row_to_reservation,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), CoworkError> {
        let payment_data = payment_json(reservation)?;
        let r = reservation.clone();
        let outcome = self
            .db
            .connection()
            .call(move |conn| {
                let inserted = conn.execute(
                    &format!(
                        "INSERT INTO reservations ({COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                    ),
                    params![
                        r.id,
                        r.user_id,
                        r.service_type.to_string(),
                        r.date.format(DATE_FORMAT).to_string(),
                        format_time(r.start_time),
                        format_time(r.end_time),
                        r.duration_hours,
                        r.guest_count,
                        r.total_price,
                        r.was_free,
                        r.status.to_string(),
                        r.payment_status.to_string(),
                        payment_data,
                        format_timestamp(r.created_at),
                        r.confirmed_at.map(format_timestamp),
                    ],
                );
                match inserted {
                    Ok(_) => Ok(None),
                    Err(rusqlite::Error::SqliteFailure(err, message))
                        if err.code == ErrorCode::ConstraintViolation =>
                    {
                        Ok(Some(message.unwrap_or_else(|| err.to_string())))
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            None => {
                debug!(
                    reservation_id = %reservation.id,
                    user_id = %reservation.user_id,
                    service = %reservation.service_type,
                    date = %reservation.date,
                    "reservation inserted"
                );
                Ok(())
            }
            Some(message) => {
                debug!(
                    reservation_id = %reservation.id,
                    reason = %message,
                    "reservation insert rejected by storage guard"
                );
                Err(CoworkError::PersistenceConflict(message))
            }
        }
    }

    async fn update_reservation(&self, reservation: &Reservation) -> Result<bool, CoworkError> {
        let payment_data = payment_json(reservation)?;
        let id = reservation.id.clone();
        let status = reservation.status.to_string();
        let payment_status = reservation.payment_status.to_string();
        let confirmed_at = reservation.confirmed_at.map(format_timestamp);
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE reservations
                     SET status = ?2, payment_status = ?3, payment_data = ?4, confirmed_at = ?5
                     WHERE id = ?1",
                    params![id, status, payment_status, payment_data, confirmed_at],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cowork_core::{PaymentStatus, ReservationStatus};
    use tempfile::tempdir;

    async fn setup() -> (SqliteReservationStore, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("res.db").to_str().unwrap())
            .await
            .unwrap();
        (SqliteReservationStore::new(db.clone()), db, dir)
    }

    fn reservation(id: &str, service: ServiceType, start: u32, end: u32) -> Reservation {
        Reservation {
            id: id.to_string(),
            user_id: "5491100000000".to_string(),
            service_type: service,
            date: NaiveDate::from_ymd_opt(2025, 11, 18).unwrap(),
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            duration_hours: f64::from(end - start),
            guest_count: 1,
            total_price: 12_000.0,
            was_free: false,
            status: ReservationStatus::Confirmed,
            payment_status: PaymentStatus::Pending,
            payment_data: Some(serde_json::json!({"provider": "transfer"})),
            created_at: Utc.with_ymd_and_hms(2025, 11, 17, 12, 0, 0).unwrap(),
            confirmed_at: Some(Utc.with_ymd_and_hms(2025, 11, 17, 12, 1, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let (store, db, _dir) = setup().await;
        let r = reservation("r1", ServiceType::MeetingRoom, 10, 12);
        store.insert_reservation(&r).await.unwrap();

        let loaded = store.get_reservation("r1").await.unwrap().unwrap();
        assert_eq!(loaded, r);
        assert!(store.get_reservation("missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn exclusive_slot_rejects_overlapping_insert() {
        let (store, db, _dir) = setup().await;
        store
            .insert_reservation(&reservation("r1", ServiceType::MeetingRoom, 10, 12))
            .await
            .unwrap();

        let err = store
            .insert_reservation(&reservation("r2", ServiceType::MeetingRoom, 11, 13))
            .await
            .unwrap_err();
        assert!(matches!(err, CoworkError::PersistenceConflict(_)), "got {err:?}");

        // back-to-back is fine
        store
            .insert_reservation(&reservation("r3", ServiceType::MeetingRoom, 12, 14))
            .await
            .unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn desks_fill_up_to_seeded_capacity() {
        let (store, db, _dir) = setup().await;
        db.seed_capacity(&cowork_config::CapacityConfig {
            desk: 2,
            meeting_room: 1,
            private_office: 1,
        })
        .await
        .unwrap();

        store
            .insert_reservation(&reservation("d1", ServiceType::Desk, 9, 12))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("d2", ServiceType::Desk, 10, 11))
            .await
            .unwrap();
        let err = store
            .insert_reservation(&reservation("d3", ServiceType::Desk, 10, 12))
            .await
            .unwrap_err();
        assert!(matches!(err, CoworkError::PersistenceConflict(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let (store, db, _dir) = setup().await;
        let r = reservation("same", ServiceType::Desk, 9, 10);
        store.insert_reservation(&r).await.unwrap();
        let mut again = reservation("same", ServiceType::Desk, 15, 16);
        again.user_id = "other".into();
        assert!(matches!(
            store.insert_reservation(&again).await,
            Err(CoworkError::PersistenceConflict(_))
        ));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_rows_free_the_slot_and_are_not_listed() {
        let (store, db, _dir) = setup().await;
        let mut r = reservation("r1", ServiceType::PrivateOffice, 10, 12);
        store.insert_reservation(&r).await.unwrap();

        r.status = ReservationStatus::Cancelled;
        assert!(store.update_reservation(&r).await.unwrap());

        let date = r.date;
        assert!(
            store
                .active_reservations(date, Some(ServiceType::PrivateOffice))
                .await
                .unwrap()
                .is_empty()
        );
        store
            .insert_reservation(&reservation("r2", ServiceType::PrivateOffice, 10, 12))
            .await
            .unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn active_reservations_filter_by_service() {
        let (store, db, _dir) = setup().await;
        store
            .insert_reservation(&reservation("m", ServiceType::MeetingRoom, 14, 15))
            .await
            .unwrap();
        store
            .insert_reservation(&reservation("d", ServiceType::Desk, 9, 10))
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 11, 18).unwrap();

        let all = store.active_reservations(date, None).await.unwrap();
        assert_eq!(
            all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["d", "m"]
        );
        let desks = store
            .active_reservations(date, Some(ServiceType::Desk))
            .await
            .unwrap();
        assert_eq!(desks.len(), 1);
        assert_eq!(store.reservations_for_user("5491100000000").await.unwrap().len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_row_returns_false() {
        let (store, db, _dir) = setup().await;
        let r = reservation("ghost", ServiceType::Desk, 9, 10);
        assert!(!store.update_reservation(&r).await.unwrap());
        db.close().await.unwrap();
    }
}
