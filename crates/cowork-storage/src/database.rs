// SPDX-FileCopyrightText: 2026 Cowork Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: PRAGMA setup, migrations, capacity seeding, lifecycle.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writers and keeps SQLITE_BUSY out of the picture. Do not open
//! extra connections for writes.

use cowork_config::{CapacityConfig, StorageConfig};
use cowork_core::{CoworkError, ServiceType};
use rusqlite::params;
use tracing::{debug, info};

use crate::migrations::run_migrations;

pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CoworkError {
    CoworkError::Storage {
        source: Box::new(e),
    }
}

/// Shared SQLite handle. Clones talk to the same background thread.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Opens (creating if needed) the database at `path` in WAL mode and
    /// applies pending migrations.
    pub async fn open(path: &str) -> Result<Self, CoworkError> {
        Self::open_with(&StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        })
        .await
    }

    pub async fn open_with(config: &StorageConfig) -> Result<Self, CoworkError> {
        let path = config.database_path.clone();
        let wal_mode = config.wal_mode;

        // Migrations need `&mut rusqlite::Connection`, so they run on a
        // short-lived blocking connection before the async one is opened.
        let migrate_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CoworkError> {
            let mut conn = rusqlite::Connection::open(&migrate_path).map_err(CoworkError::storage)?;
            let journal = if wal_mode { "WAL" } else { "DELETE" };
            conn.pragma_update_and_check(None, "journal_mode", journal, |row| {
                row.get::<_, String>(0)
            })
            .map_err(CoworkError::storage)?;
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| CoworkError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(CoworkError::storage)?;
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        info!(path = %path, wal_mode, "database opened");
        Ok(Self { conn, path })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Writes the configured per-service capacities consulted by the insert
    /// guard trigger.
    pub async fn seed_capacity(&self, capacity: &CapacityConfig) -> Result<(), CoworkError> {
        let rows: Vec<(String, u32)> = ServiceType::ALL
            .iter()
            .map(|s| (s.to_string(), capacity.for_service(*s)))
            .collect();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (service, cap) in &rows {
                    tx.execute(
                        "INSERT INTO service_capacity (service_type, capacity) VALUES (?1, ?2)
                         ON CONFLICT(service_type) DO UPDATE SET capacity = excluded.capacity",
                        params![service, cap],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(
            desk = capacity.desk,
            meeting_room = capacity.meeting_room,
            private_office = capacity.private_office,
            "service capacity seeded"
        );
        Ok(())
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), CoworkError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(CoworkError::storage)?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}
