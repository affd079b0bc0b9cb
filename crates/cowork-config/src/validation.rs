// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the semantic constraints serde cannot express: parseable opening
//! hours, a representable UTC offset, non-zero capacities and thresholds.

use crate::diagnostic::ConfigError;
use crate::model::{BreakerConfig, CoworkConfig, HoursConfig};

/// Largest UTC offset any real time zone uses, in minutes.
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every problem instead of failing fast.
pub fn validate_config(config: &CoworkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.to_lowercase().as_str()) {
        fail(format!(
            "agent.log_level `{}` must be one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let business = &config.business;
    if business.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
        fail(format!(
            "business.utc_offset_minutes must be within +/-{MAX_OFFSET_MINUTES}, got {}",
            business.utc_offset_minutes
        ));
    }
    check_hours("business.weekday_hours", &business.weekday_hours, &mut fail);
    check_hours("business.weekend_hours", &business.weekend_hours, &mut fail);
    if business.slot_step_minutes == 0 || business.slot_step_minutes > 240 {
        fail(format!(
            "business.slot_step_minutes must be between 1 and 240, got {}",
            business.slot_step_minutes
        ));
    }
    if business.max_simultaneous_spaces == Some(0) {
        fail("business.max_simultaneous_spaces must be at least 1 when set".to_string());
    }

    for (name, value) in [
        ("capacity.desk", config.capacity.desk),
        ("capacity.meeting_room", config.capacity.meeting_room),
        ("capacity.private_office", config.capacity.private_office),
    ] {
        if value == 0 {
            fail(format!("{name} must be at least 1"));
        }
    }

    if config.confirmation.pending_ttl_minutes <= 0 {
        fail(format!(
            "confirmation.pending_ttl_minutes must be positive, got {}",
            config.confirmation.pending_ttl_minutes
        ));
    }
    if config.confirmation.cooldown_minutes < 0 {
        fail(format!(
            "confirmation.cooldown_minutes must be non-negative, got {}",
            config.confirmation.cooldown_minutes
        ));
    }

    let resilience = &config.resilience;
    check_breaker("resilience.breaker", &resilience.breaker, &mut fail);
    for (circuit, breaker) in &resilience.circuits {
        check_breaker(&format!("resilience.circuits.{circuit}"), breaker, &mut fail);
    }
    if resilience.dispatcher.timeout_ms == 0 {
        fail("resilience.dispatcher.timeout_ms must be positive".to_string());
    }
    if resilience.queue.concurrency == 0 {
        fail("resilience.queue.concurrency must be at least 1".to_string());
    }
    for (queue, concurrency) in &resilience.queue.overrides {
        if *concurrency == 0 {
            fail(format!(
                "resilience.queue.overrides.{queue} must be at least 1"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_hours(key: &str, hours: &HoursConfig, fail: &mut impl FnMut(String)) {
    if hours.closed {
        return;
    }
    match hours.parse() {
        None => fail(format!(
            "{key} must use HH:MM times, got open=`{}` close=`{}`",
            hours.open, hours.close
        )),
        Some((open, close)) if open >= close => fail(format!(
            "{key} opens at {} but closes at {}",
            hours.open, hours.close
        )),
        Some(_) => {}
    }
}

fn check_breaker(key: &str, breaker: &BreakerConfig, fail: &mut impl FnMut(String)) {
    if breaker.failure_threshold == 0 {
        fail(format!("{key}.failure_threshold must be at least 1"));
    }
    if breaker.success_threshold == 0 {
        fail(format!("{key}.success_threshold must be at least 1"));
    }
    if breaker.half_open_max_calls == 0 {
        fail(format!("{key}.half_open_max_calls must be at least 1"));
    }
}
