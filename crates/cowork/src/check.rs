// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cowork check` command implementation.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use colored::Colorize;
use cowork_booking::{AvailabilityEngine, AvailabilityResult};
use cowork_config::CoworkConfig;
use cowork_core::{CoworkError, ServiceType, SystemClock};
use cowork_storage::SqliteReservationStore;

use crate::open_database;

/// Run the `cowork check` command against the configured database.
pub async fn run_check(
    config: &CoworkConfig,
    date: NaiveDate,
    start: NaiveTime,
    hours: f64,
    service: ServiceType,
    json: bool,
) -> Result<(), CoworkError> {
    let db = open_database(config).await?;
    let engine = AvailabilityEngine::new(
        Arc::new(SqliteReservationStore::new(db.clone())),
        &config.business,
        config.capacity.clone(),
        Arc::new(SystemClock),
    )?;
    let result = engine.check_availability(date, start, hours, service).await;
    db.close().await?;
    let result = result?;

    if json {
        let rendered = serde_json::to_string_pretty(&result)
            .map_err(|e| CoworkError::Internal(format!("failed to render result: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render(&result, service));
    }
    Ok(())
}

fn render(result: &AvailabilityResult, service: ServiceType) -> String {
    let mut out = String::new();
    let occupancy = match (result.occupied_spaces, result.capacity) {
        (Some(occupied), Some(capacity)) => format!(" ({occupied}/{capacity} taken)"),
        _ => String::new(),
    };
    match &result.reason {
        None => {
            out.push_str(&format!("{} {service}{occupancy}\n", "available".green().bold()));
        }
        Some(reason) => {
            out.push_str(&format!(
                "{} {service}: {reason}\n",
                "unavailable".red().bold()
            ));
            if result.alternatives.is_empty() {
                out.push_str("  no alternatives found\n");
            }
            for alt in &result.alternatives {
                out.push_str(&format!("  try {alt}\n"));
            }
        }
    }
    out
}
