// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Booking logic for the coworking reservation core.
//!
//! - [`AvailabilityEngine`] decides whether a slot can be booked and proposes
//!   alternatives when it cannot.
//! - [`ConfirmationClassifier`] reads yes/no replies.
//! - [`ConfirmationFlow`] drives a pending confirmation to a reservation.

pub mod availability;
pub mod classifier;
pub mod flow;
pub mod hours;

pub use availability::{AvailabilityEngine, AvailabilityResult};
pub use classifier::{ClassifierRule, ConfirmationClassifier, Verdict, normalize};
pub use flow::{
    ConfirmationFlow, ConfirmationOutcome, FlowError, FlowErrorKind, NOTIFICATION_QUEUE,
    NotificationReport, NotificationStatus, UserContext,
};
pub use hours::{BusinessCalendar, DayHours};
