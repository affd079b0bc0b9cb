// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the reservation core.
//!
//! WAL-mode storage with embedded refinery migrations and a single-writer
//! model via `tokio-rusqlite`. Provides the [`SqliteReservationStore`]
//! (reservation rows, guarded by a capacity trigger) and the
//! [`ReservationStateStore`] (pending confirmations and cooldown flags).

pub mod database;
pub mod migrations;
pub mod reservations;
pub mod state;

pub use database::Database;
pub use reservations::SqliteReservationStore;
pub use state::{JustConfirmedState, PendingConfirmation, ReservationStateStore};
