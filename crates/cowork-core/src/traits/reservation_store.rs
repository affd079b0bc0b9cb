// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence contract for reservations.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::CoworkError;
use crate::types::{Reservation, ServiceType};

/// Storage backend for reservation rows.
///
/// Inserts must be guarded by the backend's own conflict detection: an insert
/// that would exceed a service's concurrent capacity (or duplicate an id)
/// fails with [`CoworkError::PersistenceConflict`].
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Non-cancelled reservations on `date`, optionally restricted to one
    /// service type, ordered by start time.
    async fn active_reservations(
        &self,
        date: NaiveDate,
        service_type: Option<ServiceType>,
    ) -> Result<Vec<Reservation>, CoworkError>;

    /// Fetches a reservation by id.
    async fn get_reservation(&self, id: &str) -> Result<Option<Reservation>, CoworkError>;

    /// Inserts a new reservation.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), CoworkError>;

    /// Persists status, payment status, payment metadata and `confirmed_at`.
    ///
    /// Returns `false` when no row with that id exists.
    async fn update_reservation(&self, reservation: &Reservation) -> Result<bool, CoworkError>;
}
