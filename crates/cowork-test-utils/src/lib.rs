// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cowork integration tests.
//!
//! Provides a mock notification sender and a harness that assembles the
//! full reservation core over a temp SQLite database and a manual clock.
//!
//! # Components
//!
//! - [`MockNotifier`] - Notification sender with injectable failures
//! - [`TestHarness`] - Storage, availability engine, resilience hub and
//!   confirmation flow wired together

pub mod harness;
pub mod mock_notifier;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_notifier::MockNotifier;
