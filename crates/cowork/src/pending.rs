// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cowork pending` command implementation.

use std::sync::Arc;

use cowork_config::CoworkConfig;
use cowork_core::{CoworkError, SystemClock};
use cowork_storage::{JustConfirmedState, PendingConfirmation, ReservationStateStore};
use serde::Serialize;

use crate::open_database;

/// Structured output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct UserState {
    pub user_id: String,
    pub pending: Option<PendingConfirmation>,
    pub cooldown: JustConfirmedState,
}

pub async fn run_pending(config: &CoworkConfig, user_id: &str, json: bool) -> Result<(), CoworkError> {
    let db = open_database(config).await?;
    let state = ReservationStateStore::new(db.clone(), Arc::new(SystemClock));
    let loaded = load(&state, user_id).await;
    db.close().await?;
    let user_state = loaded?;

    if json {
        let rendered = serde_json::to_string_pretty(&user_state)
            .map_err(|e| CoworkError::Internal(format!("failed to render state: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    match &user_state.pending {
        Some(pending) => {
            let draft = &pending.draft;
            println!(
                "pending: {} on {} at {} for {}h (expires {})",
                draft.service_type,
                draft.date,
                draft.start_time.format("%H:%M"),
                draft.duration_hours,
                pending.expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => println!("pending: none"),
    }
    match (&user_state.cooldown.until, user_state.cooldown.is_active) {
        (Some(until), true) => println!("cooldown: active until {}", until.format("%H:%M UTC")),
        _ => println!("cooldown: inactive"),
    }
    if let Some(last) = &user_state.cooldown.last_reservation_id {
        println!("last reservation: {last}");
    }
    Ok(())
}

async fn load(state: &ReservationStateStore, user_id: &str) -> Result<UserState, CoworkError> {
    Ok(UserState {
        user_id: user_id.to_string(),
        pending: state.get_pending_confirmation(user_id).await?,
        cooldown: state.get_just_confirmed_state(user_id).await?,
    })
}
