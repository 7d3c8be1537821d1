//! Per-context schema migrations.
//!
//! # Responsibility
//! - Validate a context's migration list.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values are strictly increasing and start above zero.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use super::{StoreError, StoreResult};
use rusqlite::Connection;

/// One schema step owned by a context type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, sql: &'static str) -> Self {
        Self { version, sql }
    }
}

/// Returns the latest version in `migrations`, or 0 for an empty list.
pub fn latest_version(migrations: &[Migration]) -> u32 {
    migrations.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
///
/// # Errors
/// - `InvalidMigrations` when versions are not strictly increasing.
/// - `UnsupportedSchemaVersion` when the database is ahead of `migrations`.
pub fn apply_migrations(conn: &mut Connection, migrations: &[Migration]) -> StoreResult<()> {
    validate(migrations)?;

    let current_version = current_user_version(conn)?;
    let latest = latest_version(migrations);

    if current_version > latest {
        return Err(StoreError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    Ok(())
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> StoreResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn validate(migrations: &[Migration]) -> StoreResult<()> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            return Err(StoreError::InvalidMigrations(format!(
                "version {} must be greater than {previous}",
                migration.version
            )));
        }
        previous = migration.version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, current_user_version, latest_version, Migration};
    use crate::store::StoreError;
    use rusqlite::Connection;

    const STEPS: &[Migration] = &[
        Migration::new(1, "CREATE TABLE accounts (id TEXT PRIMARY KEY);"),
        Migration::new(2, "ALTER TABLE accounts ADD COLUMN email TEXT;"),
    ];

    #[test]
    fn applies_pending_steps_once() {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        apply_migrations(&mut conn, STEPS).expect("first run should apply");
        apply_migrations(&mut conn, STEPS).expect("second run should be a no-op");

        assert_eq!(
            current_user_version(&conn).expect("version should read"),
            latest_version(STEPS)
        );
    }

    #[test]
    fn resumes_from_recorded_version() {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        apply_migrations(&mut conn, &STEPS[..1]).expect("first step should apply");
        apply_migrations(&mut conn, STEPS).expect("remaining step should apply");

        conn.execute("INSERT INTO accounts (id, email) VALUES ('a', 'a@example.com');", [])
            .expect("migrated column should exist");
    }

    #[test]
    fn rejects_unordered_versions() {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        let unordered = [
            Migration::new(2, "SELECT 1;"),
            Migration::new(2, "SELECT 1;"),
        ];
        let err = apply_migrations(&mut conn, &unordered).expect_err("duplicate version must fail");
        assert!(matches!(err, StoreError::InvalidMigrations(_)));
    }

    #[test]
    fn rejects_database_ahead_of_known_steps() {
        let mut conn = Connection::open_in_memory().expect("memory db should open");
        conn.execute_batch("PRAGMA user_version = 9;")
            .expect("pragma should apply");

        let err = apply_migrations(&mut conn, STEPS).expect_err("newer schema must fail");
        assert!(matches!(
            err,
            StoreError::UnsupportedSchemaVersion {
                db_version: 9,
                latest_supported: 2
            }
        ));
    }
}
