// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound notification senders (email, calendar, messaging).

use async_trait::async_trait;

use crate::error::CoworkError;
use crate::types::{Notification, NotificationChannel, NotificationReceipt};

/// Adapter for a notification integration.
///
/// Senders are only ever invoked through the dispatcher, so an `Err` here is
/// retried when [`CoworkError::is_transient`] and counted against the
/// channel's circuit breaker.
#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    /// The channel this sender delivers on.
    fn channel(&self) -> NotificationChannel;

    /// Delivers one notification.
    async fn send(&self, notification: &Notification) -> Result<NotificationReceipt, CoworkError>;
}
