// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock sources and the timestamp format used in persisted rows.
//!
//! Everything that stores or compares wall-clock time takes a [`Clock`] so
//! TTLs and cooldowns can be exercised with a [`ManualClock`].

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::error::CoworkError;

/// Fixed-width UTC format. Lexicographic order equals chronological order,
/// which the SQL expiry comparisons rely on.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Formats a timestamp for storage.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp written by [`format_timestamp`] (or any RFC 3339 string).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CoworkError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoworkError::Internal(format!("invalid timestamp `{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 11, 18, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(10));
        assert_eq!(clock.now(), start + Duration::minutes(10));

        let shared = clock.clone();
        shared.advance(Duration::minutes(5));
        assert_eq!(clock.now(), start + Duration::minutes(15));
    }

    #[test]
    fn timestamp_format_roundtrips_and_sorts() {
        let a = Utc.with_ymd_and_hms(2025, 1, 9, 23, 59, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let (fa, fb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(fa, "2025-01-09T23:59:59.000Z");
        assert!(fa < fb);
        assert_eq!(parse_timestamp(&fa).unwrap(), a);
    }

    #[test]
    fn parse_accepts_rfc3339_offsets() {
        let parsed = parse_timestamp("2025-11-18T10:00:00-03:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 18, 13, 0, 0).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
