// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Cowork reservation core.
//!
//! This crate provides the domain types, the error taxonomy, time sources and
//! the adapter traits shared by the storage, resilience and booking crates.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoworkError;
pub use types::{
    AlternativeSlot, ConflictReason, Notification, NotificationChannel, NotificationReceipt,
    PaymentStatus, Reservation, ReservationDraft, ReservationStatus, ServiceType,
};

pub use traits::{NotificationSender, ReservationStore};
