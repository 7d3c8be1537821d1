//! Store connection options.
//!
//! # Responsibility
//! - Describe how a context's SQLite store is opened.
//! - Parse ADO-style connection strings used by workspace contexts.
//!
//! # Invariants
//! - Defaults open an in-memory store with foreign keys enforced.
//! - Unknown connection-string keys are rejected instead of ignored.

use crate::store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MEMORY_SOURCE: &str = ":memory:";

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSource {
    /// Private in-memory database, discarded when the store closes.
    Memory,
    /// Database file on disk.
    File(PathBuf),
}

impl StoreSource {
    /// Short label used in log events.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Options used by `Store::open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreOptions {
    pub source: StoreSource,
    /// Milliseconds SQLite waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            source: StoreSource::Memory,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            foreign_keys: true,
        }
    }
}

impl StoreOptions {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: StoreSource::File(path.into()),
            ..Self::default()
        }
    }

    /// Parses `Data Source=...;Busy Timeout=...;Foreign Keys=...`.
    ///
    /// Keys are case-insensitive and may omit inner spaces
    /// (`DataSource`, `busy_timeout`). `Data Source` is required;
    /// `:memory:` selects an in-memory store.
    ///
    /// # Errors
    /// - `StoreError::InvalidConfig` for empty input, malformed segments,
    ///   unknown keys, unparsable values or a missing data source.
    pub fn from_connection_string(value: &str) -> StoreResult<Self> {
        let mut options = Self::default();
        let mut source: Option<StoreSource> = None;

        for segment in value.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (raw_key, raw_value) = segment.split_once('=').ok_or_else(|| {
                StoreError::InvalidConfig(format!(
                    "connection string segment `{segment}` is not `key=value`"
                ))
            })?;
            let raw_value = raw_value.trim();

            match normalize_key(raw_key).as_str() {
                "datasource" | "filename" => {
                    if raw_value.is_empty() {
                        return Err(StoreError::InvalidConfig(
                            "connection string data source cannot be empty".to_string(),
                        ));
                    }
                    source = Some(if raw_value.eq_ignore_ascii_case(MEMORY_SOURCE) {
                        StoreSource::Memory
                    } else {
                        StoreSource::File(PathBuf::from(raw_value))
                    });
                }
                "busytimeout" => {
                    options.busy_timeout_ms = raw_value.parse().map_err(|_| {
                        StoreError::InvalidConfig(format!(
                            "busy timeout `{raw_value}` is not a millisecond count"
                        ))
                    })?;
                }
                "foreignkeys" => {
                    options.foreign_keys = parse_flag(raw_value)?;
                }
                other => {
                    return Err(StoreError::InvalidConfig(format!(
                        "unsupported connection string key `{other}`"
                    )));
                }
            }
        }

        options.source = source.ok_or_else(|| {
            StoreError::InvalidConfig("connection string has no data source".to_string())
        })?;
        Ok(options)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_flag(value: &str) -> StoreResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        other => Err(StoreError::InvalidConfig(format!(
            "expected a boolean flag, got `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreOptions, StoreSource};
    use crate::store::StoreError;
    use std::path::PathBuf;

    #[test]
    fn parses_file_source_with_overrides() {
        let options = StoreOptions::from_connection_string(
            "Data Source=/var/lib/app/accounts.db; Busy Timeout=250; Foreign Keys=off",
        )
        .expect("connection string should parse");

        assert_eq!(
            options.source,
            StoreSource::File(PathBuf::from("/var/lib/app/accounts.db"))
        );
        assert_eq!(options.busy_timeout_ms, 250);
        assert!(!options.foreign_keys);
    }

    #[test]
    fn memory_source_keeps_defaults() {
        let options = StoreOptions::from_connection_string("datasource=:memory:;")
            .expect("memory source should parse");
        assert_eq!(options, StoreOptions::memory());
    }

    #[test]
    fn rejects_unknown_keys_and_missing_source() {
        let unknown = StoreOptions::from_connection_string("Data Source=a.db;Pooling=true")
            .expect_err("unknown key must fail");
        assert!(matches!(unknown, StoreError::InvalidConfig(message) if message.contains("pooling")));

        let missing = StoreOptions::from_connection_string("Busy Timeout=10")
            .expect_err("missing data source must fail");
        assert!(matches!(missing, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_malformed_segments() {
        let err = StoreOptions::from_connection_string("Data Source")
            .expect_err("segment without `=` must fail");
        assert!(err.to_string().contains("key=value"));
    }
}
