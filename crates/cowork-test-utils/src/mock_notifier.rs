// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock notification sender for deterministic testing.
//!
//! `MockNotifier` records every delivered notification and can be told to
//! fail, either for the next few attempts or permanently, or to stall.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cowork_core::{
    CoworkError, Notification, NotificationChannel, NotificationReceipt, NotificationSender,
};

/// A notification channel that records deliveries.
pub struct MockNotifier {
    channel: NotificationChannel,
    sent: Mutex<Vec<Notification>>,
    attempts: AtomicU32,
    fail_next: AtomicU32,
    always_fail: AtomicBool,
    stall: Option<Duration>,
}

impl MockNotifier {
    pub fn new(channel: NotificationChannel) -> Self {
        Self {
            channel,
            sent: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            fail_next: AtomicU32::new(0),
            always_fail: AtomicBool::new(false),
            stall: None,
        }
    }

    /// A notifier whose every attempt fails with a transient error.
    pub fn failing(channel: NotificationChannel) -> Self {
        let notifier = Self::new(channel);
        notifier.always_fail.store(true, Ordering::SeqCst);
        notifier
    }

    /// A notifier whose every attempt hangs for `delay` before answering.
    pub fn stalled(channel: NotificationChannel, delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Self::new(channel)
        }
    }

    /// Fails the next `n` attempts with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of `send` calls, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSender for MockNotifier {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    async fn send(&self, notification: &Notification) -> Result<NotificationReceipt, CoworkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        let scheduled_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.always_fail.load(Ordering::SeqCst) {
            return Err(CoworkError::TransientIntegration {
                integration: self.channel.to_string(),
                message: "mock outage".into(),
            });
        }

        let mut sent = self.sent.lock().await;
        sent.push(notification.clone());
        Ok(NotificationReceipt {
            channel: self.channel,
            external_id: Some(format!("{}-{}", self.channel, sent.len())),
        })
    }
}
