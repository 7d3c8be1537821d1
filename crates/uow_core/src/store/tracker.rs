//! In-memory change tracker.
//!
//! # Invariants
//! - Pending changes keep staging order; the flush replays them in order.
//! - Values are captured when a change is staged.
//! - Key identity includes the SQLite storage class, so `1` and `'1'`
//!   are different entities.

use super::Entity;
use rusqlite::types::Value;
use std::collections::HashSet;

/// Lifecycle state of a staged change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingChange {
    pub state: EntityState,
    pub table: &'static str,
    pub key_column: &'static str,
    pub columns: &'static [&'static str],
    pub key: Value,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TrackedKey {
    table: &'static str,
    key: String,
}

#[derive(Debug, Default)]
pub(crate) struct ChangeTracker {
    pending: Vec<PendingChange>,
    tracked: HashSet<TrackedKey>,
}

impl ChangeTracker {
    pub fn stage<T: Entity>(&mut self, state: EntityState, entity: &T) {
        let values = match state {
            EntityState::Deleted => Vec::new(),
            EntityState::Added | EntityState::Modified => entity.values(),
        };
        self.pending.push(PendingChange {
            state,
            table: T::TABLE,
            key_column: T::KEY,
            columns: T::COLUMNS,
            key: entity.key(),
            values,
        });
    }

    pub fn attach(&mut self, table: &'static str, key: &Value) {
        self.tracked.insert(TrackedKey {
            table,
            key: identity(key),
        });
    }

    pub fn detach(&mut self, table: &'static str, key: &Value) {
        self.tracked.remove(&TrackedKey {
            table,
            key: identity(key),
        });
    }

    /// Latest staged state for the entity's key, if any.
    pub fn state_of(&self, table: &'static str, key: &Value) -> Option<EntityState> {
        let wanted = identity(key);
        self.pending
            .iter()
            .rev()
            .find(|change| change.table == table && identity(&change.key) == wanted)
            .map(|change| change.state)
    }

    pub fn pending(&self) -> &[PendingChange] {
        &self.pending
    }

    /// Clears staged changes and updates the tracked set to match them.
    pub fn accept_all(&mut self) {
        let flushed = std::mem::take(&mut self.pending);
        for change in &flushed {
            match change.state {
                EntityState::Deleted => self.detach(change.table, &change.key),
                EntityState::Added | EntityState::Modified => {
                    self.attach(change.table, &change.key)
                }
            }
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.tracked.clear();
    }
}

/// Renders a key value for log lines and error messages.
pub(crate) fn key_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => number.to_string(),
        Value::Text(text) => text.clone(),
        Value::Blob(bytes) => bytes.iter().map(|byte| format!("{byte:02x}")).collect(),
    }
}

/// Tracker identity: storage class prefix plus the rendered value.
fn identity(value: &Value) -> String {
    let class = match value {
        Value::Null => 'n',
        Value::Integer(_) => 'i',
        Value::Real(_) => 'r',
        Value::Text(_) => 't',
        Value::Blob(_) => 'b',
    };
    format!("{class}:{}", key_text(value))
}

#[cfg(test)]
mod tests {
    use super::{key_text, ChangeTracker, EntityState};
    use rusqlite::types::Value;

    #[test]
    fn key_text_renders_each_storage_class() {
        assert_eq!(key_text(&Value::Integer(42)), "42");
        assert_eq!(key_text(&Value::Text("acc-1".to_string())), "acc-1");
        assert_eq!(key_text(&Value::Blob(vec![0x0a, 0xff])), "0aff");
        assert_eq!(key_text(&Value::Null), "null");
    }

    #[test]
    fn integer_and_text_keys_are_distinct_identities() {
        let mut tracker = ChangeTracker::default();
        tracker.attach("items", &Value::Integer(1));
        tracker.attach("items", &Value::Text("1".to_string()));
        assert_eq!(tracker.tracked_count(), 2);

        tracker.detach("items", &Value::Text("1".to_string()));
        assert_eq!(tracker.tracked_count(), 1);
        assert_eq!(tracker.state_of("items", &Value::Integer(1)), None);
    }

    #[test]
    fn staged_state_is_looked_up_by_typed_key() {
        struct Item(i64);

        impl crate::store::Entity for Item {
            const TABLE: &'static str = "items";
            const KEY: &'static str = "id";
            const COLUMNS: &'static [&'static str] = &["id"];

            fn key(&self) -> Value {
                Value::Integer(self.0)
            }

            fn values(&self) -> Vec<Value> {
                vec![Value::Integer(self.0)]
            }

            fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
                Ok(Self(row.get("id")?))
            }
        }

        let mut tracker = ChangeTracker::default();
        tracker.stage(EntityState::Modified, &Item(1));
        assert_eq!(
            tracker.state_of("items", &Value::Integer(1)),
            Some(EntityState::Modified)
        );
        assert_eq!(tracker.state_of("items", &Value::Text("1".to_string())), None);
    }
}
