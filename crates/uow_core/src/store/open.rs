//! Store bootstrap.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from `StoreOptions`.
//! - Configure connection pragmas and apply the context's migrations.
//!
//! # Invariants
//! - Returned stores have migrations fully applied.
//! - `foreign_keys` and `busy_timeout` follow the supplied options.

use super::engine::Store;
use super::migrations::{apply_migrations, Migration};
use super::StoreResult;
use crate::config::{StoreOptions, StoreSource};
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

impl Store {
    /// Opens a store and applies all pending migrations.
    ///
    /// # Side effects
    /// - Creates the parent directory of a file source when missing.
    /// - Emits `store_open` logging events with duration and status.
    pub fn open(options: &StoreOptions, migrations: &[Migration]) -> StoreResult<Self> {
        let started_at = Instant::now();
        let mode = options.source.mode();
        info!("event=store_open module=store status=start mode={mode}");

        match open_connection(options, migrations) {
            Ok(conn) => {
                info!(
                    "event=store_open module=store status=ok mode={mode} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self::from_connection(conn, mode))
            }
            Err(err) => {
                error!(
                    "event=store_open module=store status=error mode={mode} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Opens a private in-memory store with default options.
    pub fn open_in_memory(migrations: &[Migration]) -> StoreResult<Self> {
        Self::open(&StoreOptions::memory(), migrations)
    }
}

fn open_connection(options: &StoreOptions, migrations: &[Migration]) -> StoreResult<Connection> {
    let mut conn = match &options.source {
        StoreSource::Memory => Connection::open_in_memory()?,
        StoreSource::File(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        }
    };

    let foreign_keys = if options.foreign_keys { "ON" } else { "OFF" };
    conn.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    apply_migrations(&mut conn, migrations)?;
    Ok(conn)
}
