// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cowork reservation core.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key is a
//! startup error rather than a silently ignored setting.

use std::collections::HashMap;

use chrono::{FixedOffset, NaiveTime};
use cowork_core::ServiceType;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoworkConfig {
    /// Assistant identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Time zone, opening hours and alternative-slot search.
    #[serde(default)]
    pub business: BusinessConfig,

    /// Concurrent capacity per service type.
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Pending-confirmation TTL and post-booking cooldown.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Circuit breakers, dispatcher retries and task queues.
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// Assistant identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "cowork".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "cowork.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Opening and closing time for one day category, as `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HoursConfig {
    /// Opening time, e.g. `"08:00"`.
    #[serde(default)]
    pub open: String,

    /// Closing time; reservations must end at or before it.
    #[serde(default)]
    pub close: String,

    /// Closed all day; `open`/`close` are ignored.
    #[serde(default)]
    pub closed: bool,
}

impl HoursConfig {
    pub fn new(open: &str, close: &str) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
            closed: false,
        }
    }

    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::new("00:00", "00:00")
        }
    }

    /// Parsed `(open, close)`; `None` if either is not a valid `HH:MM`.
    pub fn parse(&self) -> Option<(NaiveTime, NaiveTime)> {
        let open = NaiveTime::parse_from_str(self.open.trim(), "%H:%M").ok()?;
        let close = NaiveTime::parse_from_str(self.close.trim(), "%H:%M").ok()?;
        Some((open, close))
    }
}

/// Business calendar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessConfig {
    /// Fixed offset of the business's local time from UTC, in minutes.
    /// Defaults to UTC-03:00.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Monday-Friday hours.
    #[serde(default = "default_weekday_hours")]
    pub weekday_hours: HoursConfig,

    /// Saturday-Sunday hours.
    #[serde(default = "default_weekend_hours")]
    pub weekend_hours: HoursConfig,

    /// Step between candidate alternative start times.
    #[serde(default = "default_slot_step_minutes")]
    pub slot_step_minutes: u32,

    /// Maximum same-day alternatives offered on a conflict.
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,

    /// How many days ahead to look for a next-day alternative.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,

    /// Building-wide ceiling on simultaneous reservations of any type.
    #[serde(default)]
    pub max_simultaneous_spaces: Option<u32>,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            weekday_hours: default_weekday_hours(),
            weekend_hours: default_weekend_hours(),
            slot_step_minutes: default_slot_step_minutes(),
            max_alternatives: default_max_alternatives(),
            lookahead_days: default_lookahead_days(),
            max_simultaneous_spaces: None,
        }
    }
}

impl BusinessConfig {
    /// The business time zone, if the configured offset is representable.
    pub fn offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }
}

fn default_utc_offset_minutes() -> i32 {
    -180
}

fn default_weekday_hours() -> HoursConfig {
    HoursConfig::new("08:00", "20:00")
}

fn default_weekend_hours() -> HoursConfig {
    HoursConfig::new("09:00", "14:00")
}

fn default_slot_step_minutes() -> u32 {
    30
}

fn default_max_alternatives() -> usize {
    3
}

fn default_lookahead_days() -> u32 {
    7
}

/// Concurrent capacity per service type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CapacityConfig {
    /// Hot desks bookable at the same time.
    #[serde(default = "default_desk_capacity")]
    pub desk: u32,

    /// Meeting rooms bookable at the same time.
    #[serde(default = "default_exclusive_capacity")]
    pub meeting_room: u32,

    /// Private offices bookable at the same time.
    #[serde(default = "default_exclusive_capacity")]
    pub private_office: u32,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            desk: default_desk_capacity(),
            meeting_room: default_exclusive_capacity(),
            private_office: default_exclusive_capacity(),
        }
    }
}

impl CapacityConfig {
    /// Capacity for one service type.
    pub fn for_service(&self, service: ServiceType) -> u32 {
        match service {
            ServiceType::Desk => self.desk,
            ServiceType::MeetingRoom => self.meeting_room,
            ServiceType::PrivateOffice => self.private_office,
        }
    }
}

fn default_desk_capacity() -> u32 {
    10
}

fn default_exclusive_capacity() -> u32 {
    1
}

/// Confirmation state timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// Lifetime of a pending confirmation.
    #[serde(default = "default_pending_ttl_minutes")]
    pub pending_ttl_minutes: i64,

    /// How long booking prompts are suppressed after a confirmation.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    /// Wait for notification delivery before reporting a confirmation.
    /// When false, notifications are queued and failures are only logged.
    #[serde(default = "default_wait_for_notifications")]
    pub wait_for_notifications: bool,

    /// Upper bound on that wait. Channels still in flight when it elapses
    /// are reported as queued and keep retrying in the background.
    #[serde(default = "default_notification_wait_ms")]
    pub notification_wait_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            pending_ttl_minutes: default_pending_ttl_minutes(),
            cooldown_minutes: default_cooldown_minutes(),
            wait_for_notifications: default_wait_for_notifications(),
            notification_wait_ms: default_notification_wait_ms(),
        }
    }
}

fn default_pending_ttl_minutes() -> i64 {
    30
}

fn default_cooldown_minutes() -> i64 {
    10
}

fn default_wait_for_notifications() -> bool {
    true
}

fn default_notification_wait_ms() -> u64 {
    1500
}

/// Resilience layer configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Defaults applied to every circuit breaker.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Per-integration breaker overrides, keyed by circuit id.
    #[serde(default)]
    pub circuits: HashMap<String, BreakerConfig>,

    /// Timeout and retry policy for outbound calls.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Task queue concurrency.
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successful trial calls needed to close it again.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds an open circuit rejects calls before allowing a trial.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,

    /// Trial calls allowed in flight while half-open.
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    2
}

/// Outbound call policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Hard timeout for a single attempt, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay before a retry, doubled on each attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    400
}

/// Task queue concurrency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Default number of tasks a queue runs at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-queue concurrency overrides, keyed by queue name.
    #[serde(default)]
    pub overrides: HashMap<String, usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            overrides: HashMap::new(),
        }
    }
}

fn default_concurrency() -> usize {
    2
}
