// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opening hours in the business's fixed local time zone.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use cowork_config::{BusinessConfig, HoursConfig};
use cowork_core::CoworkError;

/// Open/close times for one day. `close` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    /// Whether `[start, end)` lies entirely within the day's hours.
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.open && end <= self.close && start < end
    }
}

/// Weekday/weekend schedule plus the local UTC offset.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    offset: FixedOffset,
    weekday: Option<DayHours>,
    weekend: Option<DayHours>,
}

impl BusinessCalendar {
    pub fn new(offset: FixedOffset, weekday: Option<DayHours>, weekend: Option<DayHours>) -> Self {
        Self {
            offset,
            weekday,
            weekend,
        }
    }

    pub fn from_config(config: &BusinessConfig) -> Result<Self, CoworkError> {
        let offset = config.offset().ok_or_else(|| {
            CoworkError::Config(format!(
                "business.utc_offset_minutes {} is out of range",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self {
            offset,
            weekday: parse_hours("weekday_hours", &config.weekday_hours)?,
            weekend: parse_hours("weekend_hours", &config.weekend_hours)?,
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Hours for `date`, or `None` when closed that day.
    pub fn hours_for(&self, date: NaiveDate) -> Option<DayHours> {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => self.weekend,
            _ => self.weekday,
        }
    }

    /// Current local wall-clock time in the business zone.
    pub fn local_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset).naive_local()
    }

    /// Whether the local instant `date start` is before `now`.
    pub fn is_past(&self, date: NaiveDate, start: NaiveTime, now: DateTime<Utc>) -> bool {
        date.and_time(start) < self.local_now(now)
    }
}

fn parse_hours(section: &str, hours: &HoursConfig) -> Result<Option<DayHours>, CoworkError> {
    if hours.closed {
        return Ok(None);
    }
    let (open, close) = hours.parse().ok_or_else(|| {
        CoworkError::Config(format!(
            "business.{section} must use HH:MM, got `{}`-`{}`",
            hours.open, hours.close
        ))
    })?;
    if open >= close {
        return Err(CoworkError::Config(format!(
            "business.{section} opens at {open} but closes at {close}"
        )));
    }
    Ok(Some(DayHours { open, close }))
}
