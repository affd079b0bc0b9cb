// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the reservation core.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoworkError;

/// Longest bookable interval, in minutes.
const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Kind of space being booked.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Desk,
    MeetingRoom,
    PrivateOffice,
}

impl ServiceType {
    pub const ALL: [ServiceType; 3] = [
        ServiceType::Desk,
        ServiceType::MeetingRoom,
        ServiceType::PrivateOffice,
    ];
}

/// Lifecycle status of a reservation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ReservationStatus {
    Pending,
    PendingPayment,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Whether a reservation in this status occupies its slot.
    pub fn occupies_slot(self) -> bool {
        self != ReservationStatus::Cancelled
    }
}

/// Payment state of a reservation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Waived,
}

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` overlap iff
/// `s1 < e2 && s2 < e1`. Touching boundaries do not overlap.
pub fn intervals_overlap(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && s2 < e1
}

/// Converts fractional hours into whole minutes, rejecting non-positive,
/// non-finite or longer-than-a-day durations.
pub fn duration_minutes(hours: f64) -> Result<i64, CoworkError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(CoworkError::Validation(format!(
            "duration must be a positive number of hours, got {hours}"
        )));
    }
    let minutes = (hours * 60.0).round() as i64;
    if minutes == 0 || minutes > MAX_DURATION_MINUTES {
        return Err(CoworkError::Validation(format!(
            "duration of {hours}h is out of range"
        )));
    }
    Ok(minutes)
}

/// Computes the end time of an interval that must finish within the same day.
pub fn end_time_for(start: NaiveTime, minutes: i64) -> Result<NaiveTime, CoworkError> {
    let (end, wrapped) = start.overflowing_add_signed(Duration::minutes(minutes));
    if wrapped != 0 {
        return Err(CoworkError::Validation(format!(
            "interval starting at {} for {minutes} minutes crosses midnight",
            start.format("%H:%M")
        )));
    }
    Ok(end)
}

/// A booked or drafted use of a space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub service_type: ServiceType,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_hours: f64,
    pub guest_count: u32,
    pub total_price: f64,
    pub was_free: bool,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    /// Opaque payment-provider metadata.
    pub payment_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Whether this reservation overlaps `[start, end)` on its own date.
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        intervals_overlap(self.start_time, self.end_time, start, end)
    }

    pub fn is_active(&self) -> bool {
        self.status.occupies_slot()
    }
}

fn default_draft_status() -> ReservationStatus {
    ReservationStatus::Confirmed
}

fn default_payment_status() -> PaymentStatus {
    PaymentStatus::Pending
}

/// The would-be reservation fields held while awaiting a yes/no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub user_id: String,
    pub service_type: ServiceType,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: f64,
    #[serde(default = "default_guest_count")]
    pub guest_count: u32,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub was_free: bool,
    /// Status the reservation is created with once the user says yes.
    #[serde(default = "default_draft_status")]
    pub status: ReservationStatus,
    #[serde(default = "default_payment_status")]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_data: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

fn default_guest_count() -> u32 {
    1
}

impl ReservationDraft {
    /// Creates a minimal draft with sensible defaults for the optional fields.
    pub fn new(
        user_id: impl Into<String>,
        service_type: ServiceType,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_hours: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            service_type,
            date,
            start_time,
            duration_hours,
            guest_count: default_guest_count(),
            total_price: 0.0,
            was_free: false,
            status: default_draft_status(),
            payment_status: default_payment_status(),
            payment_data: None,
            customer_name: None,
            customer_email: None,
        }
    }

    /// End of the drafted interval.
    pub fn end_time(&self) -> Result<NaiveTime, CoworkError> {
        end_time_for(self.start_time, duration_minutes(self.duration_hours)?)
    }

    /// Checks the fields a reservation cannot be created without.
    pub fn validate(&self) -> Result<(), CoworkError> {
        if self.user_id.trim().is_empty() {
            return Err(CoworkError::Validation("user id is required".into()));
        }
        if self.guest_count == 0 {
            return Err(CoworkError::Validation(
                "guest count must be at least 1".into(),
            ));
        }
        if !self.total_price.is_finite() || self.total_price < 0.0 {
            return Err(CoworkError::Validation(format!(
                "total price must be non-negative, got {}",
                self.total_price
            )));
        }
        if matches!(
            self.status,
            ReservationStatus::Cancelled | ReservationStatus::Completed
        ) {
            return Err(CoworkError::Validation(format!(
                "a reservation cannot be created as {}",
                self.status
            )));
        }
        self.end_time()?;
        Ok(())
    }
}

/// A bookable slot proposed instead of a rejected one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl fmt::Display for AlternativeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Why a slot was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    /// The start instant is already in the past in the business time zone.
    Past,
    /// The business is closed on that day.
    Closed,
    /// The interval falls outside the day's opening hours.
    OutsideOperatingHours { open: NaiveTime, close: NaiveTime },
    /// The service type is fully booked for part of the interval.
    CapacityReached { occupied: u32, capacity: u32 },
    /// The building-wide ceiling across all service types is reached.
    GlobalCapacityReached { occupied: u32, ceiling: u32 },
    /// Another booking claimed the slot while this one was being saved.
    ConcurrentBooking,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::Past => write!(f, "the requested time is in the past"),
            ConflictReason::Closed => write!(f, "the space is closed that day"),
            ConflictReason::OutsideOperatingHours { open, close } => write!(
                f,
                "outside operating hours ({}-{})",
                open.format("%H:%M"),
                close.format("%H:%M")
            ),
            ConflictReason::CapacityReached { occupied, capacity } => {
                write!(f, "fully booked ({occupied}/{capacity} spaces taken)")
            }
            ConflictReason::GlobalCapacityReached { occupied, ceiling } => {
                write!(f, "building at capacity ({occupied}/{ceiling} spaces taken)")
            }
            ConflictReason::ConcurrentBooking => {
                write!(f, "the slot was just booked by someone else")
            }
        }
    }
}

/// Outbound notification channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Calendar,
    Messaging,
}

/// Payload handed to notification senders after a booking is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub reservation: Reservation,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

/// What a sender reports back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub channel: NotificationChannel,
    /// Provider-side identifier (calendar event id, message id), if any.
    pub external_id: Option<String>,
}
