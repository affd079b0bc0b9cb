// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams between the reservation core and its
//! collaborators.
//!
//! Both traits use `#[async_trait]` so implementations can be held as
//! `Arc<dyn Trait>`.

pub mod notifier;
pub mod reservation_store;

pub use notifier::NotificationSender;
pub use reservation_store::ReservationStore;
