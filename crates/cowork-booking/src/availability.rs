// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slot availability, alternative suggestions and reservation creation.
//!
//! The availability check is read-only and is not atomic with the insert
//! that follows it. Races are settled by the storage insert guard; when it
//! fires, [`AvailabilityEngine::create_reservation`] recomputes availability
//! so the caller gets alternatives that reflect the winning write.

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use cowork_config::{BusinessConfig, CapacityConfig};
use cowork_core::types::{duration_minutes, end_time_for};
use cowork_core::{
    AlternativeSlot, Clock, ConflictReason, CoworkError, PaymentStatus, Reservation,
    ReservationDraft, ReservationStatus, ReservationStore, ServiceType,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::hours::BusinessCalendar;

/// Outcome of an availability check.
///
/// `reason` is set exactly when `available` is false. Occupancy and capacity
/// are reported once the capacity stage has been reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub available: bool,
    pub reason: Option<ConflictReason>,
    pub alternatives: Vec<AlternativeSlot>,
    pub occupied_spaces: Option<u32>,
    pub capacity: Option<u32>,
}

impl AvailabilityResult {
    /// The conflict error for an unavailable result, `None` when available.
    pub fn conflict(&self) -> Option<CoworkError> {
        self.reason
            .as_ref()
            .map(|reason| CoworkError::AvailabilityConflict {
                reason: reason.clone(),
                alternatives: self.alternatives.clone(),
            })
    }
}

/// Verdict for one concrete interval.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotVerdict {
    reason: Option<ConflictReason>,
    occupied: Option<u32>,
    capacity: Option<u32>,
}

impl SlotVerdict {
    fn rejected(reason: ConflictReason) -> Self {
        Self {
            reason: Some(reason),
            occupied: None,
            capacity: None,
        }
    }

    fn is_free(&self) -> bool {
        self.reason.is_none()
    }
}

/// Availability rules over a [`ReservationStore`].
pub struct AvailabilityEngine {
    store: Arc<dyn ReservationStore>,
    calendar: BusinessCalendar,
    capacity: CapacityConfig,
    clock: Arc<dyn Clock>,
    slot_step: Duration,
    max_alternatives: usize,
    lookahead_days: u32,
    max_simultaneous_spaces: Option<u32>,
}

impl std::fmt::Debug for AvailabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityEngine")
            .field("calendar", &self.calendar)
            .field("capacity", &self.capacity)
            .field("slot_step", &self.slot_step)
            .field("max_alternatives", &self.max_alternatives)
            .field("max_simultaneous_spaces", &self.max_simultaneous_spaces)
            .finish_non_exhaustive()
    }
}

impl AvailabilityEngine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        business: &BusinessConfig,
        capacity: CapacityConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoworkError> {
        Ok(Self {
            store,
            calendar: BusinessCalendar::from_config(business)?,
            capacity,
            clock,
            slot_step: Duration::minutes(i64::from(business.slot_step_minutes.max(1))),
            max_alternatives: business.max_alternatives,
            lookahead_days: business.lookahead_days,
            max_simultaneous_spaces: business.max_simultaneous_spaces,
        })
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    /// Checks whether `duration_hours` starting at `start_time` on `date` can
    /// be booked for `service_type`, proposing alternatives when not.
    ///
    /// Invalid durations (non-positive, longer than a day, or crossing
    /// midnight) are a [`CoworkError::Validation`].
    pub async fn check_availability(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_hours: f64,
        service_type: ServiceType,
    ) -> Result<AvailabilityResult, CoworkError> {
        let minutes = duration_minutes(duration_hours)?;
        let end_time = end_time_for(start_time, minutes)?;
        let now = self.clock.now();

        let verdict = if self.calendar.is_past(date, start_time, now) {
            SlotVerdict::rejected(ConflictReason::Past)
        } else {
            let day = self.store.active_reservations(date, None).await?;
            self.judge(date, start_time, end_time, service_type, now, &day)
        };

        let alternatives = if verdict.is_free() {
            Vec::new()
        } else {
            self.find_alternatives(date, start_time, minutes, service_type, now)
                .await?
        };

        debug!(
            %date,
            start = %start_time.format("%H:%M"),
            end = %end_time.format("%H:%M"),
            service = %service_type,
            available = verdict.is_free(),
            reason = ?verdict.reason,
            alternatives = alternatives.len(),
            "availability checked"
        );

        Ok(AvailabilityResult {
            available: verdict.is_free(),
            reason: verdict.reason,
            alternatives,
            occupied_spaces: verdict.occupied,
            capacity: verdict.capacity,
        })
    }

    /// Validates `draft`, checks availability and inserts the reservation.
    ///
    /// A slot that is taken, either at check time or by a concurrent writer
    /// at insert time, yields [`CoworkError::AvailabilityConflict`] carrying
    /// alternatives computed after the fact.
    pub async fn create_reservation(
        &self,
        draft: &ReservationDraft,
    ) -> Result<Reservation, CoworkError> {
        draft.validate()?;
        let check = self
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

        let reservation = self.build_reservation(draft)?;
        match self.store.insert_reservation(&reservation).await {
            Ok(()) => {
                info!(
                    reservation_id = %reservation.id,
                    user_id = %reservation.user_id,
                    service = %reservation.service_type,
                    date = %reservation.date,
                    start = %reservation.start_time.format("%H:%M"),
                    status = %reservation.status,
                    "reservation created"
                );
                Ok(reservation)
            }
            Err(CoworkError::PersistenceConflict(detail)) => {
                warn!(
                    user_id = %reservation.user_id,
                    service = %reservation.service_type,
                    date = %reservation.date,
                    start = %reservation.start_time.format("%H:%M"),
                    detail = %detail,
                    "slot taken by a concurrent booking, recomputing alternatives"
                );
                Err(self.fresh_conflict(draft).await?)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels a reservation. Cancelling twice is a no-op; completed
    /// reservations cannot be changed.
    pub async fn cancel_reservation(&self, id: &str) -> Result<Reservation, CoworkError> {
        let mut reservation = self.load_mutable(id).await?;
        if reservation.status == ReservationStatus::Cancelled {
            return Ok(reservation);
        }
        reservation.status = ReservationStatus::Cancelled;
        self.persist(&reservation).await?;
        info!(reservation_id = %id, user_id = %reservation.user_id, "reservation cancelled");
        Ok(reservation)
    }

    /// Records a verified payment and confirms the reservation.
    pub async fn confirm_payment(
        &self,
        id: &str,
        payment_data: Option<serde_json::Value>,
    ) -> Result<Reservation, CoworkError> {
        let mut reservation = self.load_mutable(id).await?;
        if reservation.status == ReservationStatus::Cancelled {
            return Err(CoworkError::Validation(format!(
                "reservation {id} is cancelled"
            )));
        }
        reservation.payment_status = PaymentStatus::Paid;
        if payment_data.is_some() {
            reservation.payment_data = payment_data;
        }
        reservation.status = ReservationStatus::Confirmed;
        if reservation.confirmed_at.is_none() {
            reservation.confirmed_at = Some(self.clock.now());
        }
        self.persist(&reservation).await?;
        info!(reservation_id = %id, user_id = %reservation.user_id, "payment confirmed");
        Ok(reservation)
    }

    async fn load_mutable(&self, id: &str) -> Result<Reservation, CoworkError> {
        let reservation = self
            .store
            .get_reservation(id)
            .await?
            .ok_or_else(|| CoworkError::Validation(format!("reservation {id} not found")))?;
        if reservation.status == ReservationStatus::Completed {
            return Err(CoworkError::Validation(format!(
                "reservation {id} is completed and cannot be changed"
            )));
        }
        Ok(reservation)
    }

    async fn persist(&self, reservation: &Reservation) -> Result<(), CoworkError> {
        if self.store.update_reservation(reservation).await? {
            Ok(())
        } else {
            Err(CoworkError::Validation(format!(
                "reservation {} not found",
                reservation.id
            )))
        }
    }

    fn build_reservation(&self, draft: &ReservationDraft) -> Result<Reservation, CoworkError> {
        let now = self.clock.now();
        Ok(Reservation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: draft.user_id.clone(),
            service_type: draft.service_type,
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time()?,
            duration_hours: draft.duration_hours,
            guest_count: draft.guest_count,
            total_price: draft.total_price,
            was_free: draft.was_free,
            status: draft.status,
            payment_status: draft.payment_status,
            payment_data: draft.payment_data.clone(),
            created_at: now,
            confirmed_at: (draft.status == ReservationStatus::Confirmed).then_some(now),
        })
    }

    /// Conflict for a draft whose insert lost a race.
    async fn fresh_conflict(&self, draft: &ReservationDraft) -> Result<CoworkError, CoworkError> {
        let recheck = self
            .check_availability(
                draft.date,
                draft.start_time,
                draft.duration_hours,
                draft.service_type,
            )
            .await?;
        if let Some(conflict) = recheck.conflict() {
            return Ok(conflict);
        }

        // The guard fired but the slot reads as free again (the winner was
        // cancelled in between).
        let minutes = duration_minutes(draft.duration_hours)?;
        let alternatives = self
            .find_alternatives(
                draft.date,
                draft.start_time,
                minutes,
                draft.service_type,
                self.clock.now(),
            )
            .await?;
        Ok(CoworkError::AvailabilityConflict {
            reason: ConflictReason::ConcurrentBooking,
            alternatives,
        })
    }

    /// Applies the closed-day, operating-hours, capacity and global-ceiling
    /// rules to one interval. `day` holds the active reservations of `date`
    /// across every service type.
    fn judge(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        service: ServiceType,
        now: DateTime<Utc>,
        day: &[Reservation],
    ) -> SlotVerdict {
        if self.calendar.is_past(date, start, now) {
            return SlotVerdict::rejected(ConflictReason::Past);
        }
        let Some(hours) = self.calendar.hours_for(date) else {
            return SlotVerdict::rejected(ConflictReason::Closed);
        };
        if !hours.contains(start, end) {
            return SlotVerdict::rejected(ConflictReason::OutsideOperatingHours {
                open: hours.open,
                close: hours.close,
            });
        }

        let overlapping = day
            .iter()
            .filter(|r| r.is_active() && r.overlaps(start, end));
        let occupied = overlapping
            .clone()
            .filter(|r| r.service_type == service)
            .count() as u32;
        let capacity = self.capacity.for_service(service);
        let mut verdict = SlotVerdict {
            reason: None,
            occupied: Some(occupied),
            capacity: Some(capacity),
        };
        if occupied >= capacity {
            verdict.reason = Some(ConflictReason::CapacityReached { occupied, capacity });
            return verdict;
        }
        if let Some(ceiling) = self.max_simultaneous_spaces {
            let total = overlapping.count() as u32;
            if total >= ceiling {
                verdict.reason = Some(ConflictReason::GlobalCapacityReached {
                    occupied: total,
                    ceiling,
                });
            }
        }
        verdict
    }

    /// Up to `max_alternatives` slots later on `date`, or failing that the
    /// first open slot within the lookahead window.
    async fn find_alternatives(
        &self,
        date: NaiveDate,
        requested_start: NaiveTime,
        minutes: i64,
        service: ServiceType,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlternativeSlot>, CoworkError> {
        let mut found = Vec::new();
        if self.max_alternatives == 0 {
            return Ok(found);
        }

        self.scan_day(
            date,
            Some(requested_start),
            minutes,
            service,
            now,
            self.max_alternatives,
            &mut found,
        )
        .await?;

        let mut ahead = 1;
        while found.is_empty() && ahead <= self.lookahead_days {
            let Some(next) = date.checked_add_days(Days::new(u64::from(ahead))) else {
                break;
            };
            self.scan_day(next, None, minutes, service, now, 1, &mut found)
                .await?;
            ahead += 1;
        }
        Ok(found)
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_day(
        &self,
        date: NaiveDate,
        from: Option<NaiveTime>,
        minutes: i64,
        service: ServiceType,
        now: DateTime<Utc>,
        limit: usize,
        found: &mut Vec<AlternativeSlot>,
    ) -> Result<(), CoworkError> {
        let Some(hours) = self.calendar.hours_for(date) else {
            return Ok(());
        };
        let local_now = self.calendar.local_now(now);
        if date < local_now.date() {
            return Ok(());
        }

        let mut cursor = from.map_or(hours.open, |from| from.max(hours.open));
        if date == local_now.date() {
            let Some(next_step) = round_up(local_now.time(), self.slot_step) else {
                return Ok(());
            };
            cursor = cursor.max(next_step);
        }

        let day = self.store.active_reservations(date, None).await?;
        let target = found.len() + limit;
        loop {
            let Ok(end) = end_time_for(cursor, minutes) else {
                break;
            };
            if end > hours.close {
                break;
            }
            if self.judge(date, cursor, end, service, now, &day).is_free() {
                found.push(AlternativeSlot {
                    date,
                    start_time: cursor,
                    end_time: end,
                });
                if found.len() >= target {
                    break;
                }
            }
            let (next, wrapped) = cursor.overflowing_add_signed(self.slot_step);
            if wrapped != 0 {
                break;
            }
            cursor = next;
        }
        Ok(())
    }
}

/// Rounds `time` up to the next multiple of `step` past midnight. `None`
/// when that falls on or after the next midnight.
fn round_up(time: NaiveTime, step: Duration) -> Option<NaiveTime> {
    let step_secs = u32::try_from(step.num_seconds()).ok().filter(|s| *s > 0)?;
    let mut secs = time.num_seconds_from_midnight();
    if time.nanosecond() > 0 {
        secs += 1;
    }
    let rounded = secs.div_ceil(step_secs) * step_secs;
    NaiveTime::from_num_seconds_from_midnight_opt(rounded, 0)
}
