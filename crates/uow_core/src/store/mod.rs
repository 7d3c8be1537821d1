//! SQLite persistence engine adapter.
//!
//! # Responsibility
//! - Open and configure SQLite stores and apply per-context migrations.
//! - Offer a composable query pipeline, a change tracker with an atomic
//!   flush, and explicit transaction primitives.
//!
//! # Invariants
//! - Staged changes never reach SQLite before `Store::save_changes`.
//! - A failed flush leaves the database and the staged changes untouched.
//! - A store admits at most one open explicit transaction.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod context;
mod engine;
pub mod migrations;
mod open;
mod query;
mod tracker;
mod transaction;

pub use context::DbContext;
pub(crate) use context::short_type_name;
pub use engine::{Entity, Store};
pub use migrations::Migration;
pub use query::{Filter, Include, Projection, Query};
pub use tracker::EntityState;
pub use transaction::{Transaction, TransactionState};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure surfaced by the persistence engine.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    InvalidConfig(String),
    InvalidMigrations(String),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The store was closed by its owner.
    Closed,
    /// An update or delete matched no row during a flush.
    Concurrency {
        table: &'static str,
        key: String,
    },
    InvalidIdentifier(String),
    UnknownColumn {
        table: &'static str,
        column: String,
    },
    TransactionAlreadyActive,
    TransactionNotActive,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::InvalidConfig(message) => write!(f, "invalid store configuration: {message}"),
            Self::InvalidMigrations(message) => write!(f, "invalid migration list: {message}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Closed => write!(f, "store is closed"),
            Self::Concurrency { table, key } => write!(
                f,
                "expected to affect one row in `{table}` for key `{key}`, affected none"
            ),
            Self::InvalidIdentifier(value) => write!(f, "invalid sql identifier `{value}`"),
            Self::UnknownColumn { table, column } => {
                write!(f, "table `{table}` has no column `{column}`")
            }
            Self::TransactionAlreadyActive => write!(f, "a transaction is already active"),
            Self::TransactionNotActive => write!(f, "transaction is no longer active"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
