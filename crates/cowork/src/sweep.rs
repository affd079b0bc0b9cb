// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cowork sweep` command implementation.
//!
//! Intended to run from cron. Removes expired pending confirmations and
//! clears cooldown flags whose window has passed.

use std::sync::Arc;

use cowork_config::CoworkConfig;
use cowork_core::{CoworkError, SystemClock};
use cowork_storage::ReservationStateStore;
use serde::Serialize;
use tracing::info;

use crate::open_database;

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub expired_confirmations: usize,
    pub cleared_cooldowns: usize,
}

pub async fn run_sweep(config: &CoworkConfig, json: bool) -> Result<(), CoworkError> {
    let db = open_database(config).await?;
    let state = ReservationStateStore::new(db.clone(), Arc::new(SystemClock));
    let report = sweep(&state).await;
    db.close().await?;
    let report = report?;

    info!(
        expired_confirmations = report.expired_confirmations,
        cleared_cooldowns = report.cleared_cooldowns,
        "sweep finished"
    );
    if json {
        let rendered = serde_json::to_string(&report)
            .map_err(|e| CoworkError::Internal(format!("failed to render report: {e}")))?;
        println!("{rendered}");
    } else {
        println!(
            "removed {} expired confirmation(s), cleared {} cooldown flag(s)",
            report.expired_confirmations, report.cleared_cooldowns
        );
    }
    Ok(())
}

async fn sweep(state: &ReservationStateStore) -> Result<SweepReport, CoworkError> {
    Ok(SweepReport {
        expired_confirmations: state.cleanup_expired_confirmations().await?,
        cleared_cooldowns: state.cleanup_just_confirmed_flags().await?,
    })
}
