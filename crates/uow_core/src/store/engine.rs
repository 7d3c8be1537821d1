//! Store session: connection, change tracker and flush.

use super::query::Query;
use super::tracker::{key_text, ChangeTracker, EntityState, PendingChange};
use super::{StoreError, StoreResult};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::cell::{Cell, Ref, RefCell};
use std::time::Instant;
use uuid::Uuid;

const FLUSH_SAVEPOINT: &str = "uow_flush";

/// Row-mapped record type persisted in one table.
///
/// `values()` must yield one value per entry of `COLUMNS`, in the same
/// order. `KEY` names the primary key column and must be listed in
/// `COLUMNS`.
pub trait Entity: Sized + 'static {
    const TABLE: &'static str;
    const KEY: &'static str;
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Value;
    fn values(&self) -> Vec<Value>;
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// One SQLite session with change tracking.
///
/// Not shareable across threads; a store belongs to one context, which
/// belongs to one unit of work.
pub struct Store {
    conn: RefCell<Option<Connection>>,
    tracker: RefCell<ChangeTracker>,
    active_transaction: Cell<Option<Uuid>>,
    mode: &'static str,
}

impl Store {
    pub(crate) fn from_connection(conn: Connection, mode: &'static str) -> Self {
        Self {
            conn: RefCell::new(Some(conn)),
            tracker: RefCell::new(ChangeTracker::default()),
            active_transaction: Cell::new(None),
            mode,
        }
    }

    /// Starts a tracked query over `T`'s table.
    pub fn query<T: Entity>(&self) -> Query<'_, T> {
        Query::new(self)
    }

    /// Counts every row of `T`'s table, ignoring any filter.
    pub fn count<T: Entity>(&self) -> StoreResult<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {};", T::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Stages an insert.
    pub fn add<T: Entity>(&self, entity: &T) -> StoreResult<()> {
        self.stage(EntityState::Added, entity)
    }

    /// Stages a full-row update keyed by `T::KEY`.
    pub fn update<T: Entity>(&self, entity: &T) -> StoreResult<()> {
        self.stage(EntityState::Modified, entity)
    }

    /// Stages a delete keyed by `T::KEY`.
    pub fn remove<T: Entity>(&self, entity: &T) -> StoreResult<()> {
        self.stage(EntityState::Deleted, entity)
    }

    pub fn add_range<'e, T, I>(&self, entities: I) -> StoreResult<usize>
    where
        T: Entity,
        I: IntoIterator<Item = &'e T>,
    {
        self.stage_range(EntityState::Added, entities)
    }

    pub fn update_range<'e, T, I>(&self, entities: I) -> StoreResult<usize>
    where
        T: Entity,
        I: IntoIterator<Item = &'e T>,
    {
        self.stage_range(EntityState::Modified, entities)
    }

    pub fn remove_range<'e, T, I>(&self, entities: I) -> StoreResult<usize>
    where
        T: Entity,
        I: IntoIterator<Item = &'e T>,
    {
        self.stage_range(EntityState::Deleted, entities)
    }

    /// Latest staged state of `entity`, or `None` when nothing is pending.
    pub fn entry_state<T: Entity>(&self, entity: &T) -> Option<EntityState> {
        self.tracker.borrow().state_of(T::TABLE, &entity.key())
    }

    pub fn has_changes(&self) -> bool {
        !self.tracker.borrow().pending().is_empty()
    }

    pub fn pending_changes(&self) -> usize {
        self.tracker.borrow().pending().len()
    }

    /// Number of distinct entity keys currently tracked.
    pub fn tracked_entities(&self) -> usize {
        self.tracker.borrow().tracked_count()
    }

    /// Writes all staged changes in one savepoint.
    ///
    /// Returns the number of affected rows. On failure the savepoint is
    /// rolled back, staged changes are kept, and the original error is
    /// returned.
    pub fn save_changes(&self) -> StoreResult<usize> {
        let started_at = Instant::now();
        let conn = self.connection()?;

        let outcome = {
            let tracker = self.tracker.borrow();
            let pending = tracker.pending();
            if pending.is_empty() {
                debug!("event=store_flush module=store status=skip changes=0");
                return Ok(0);
            }

            conn.execute_batch(&format!("SAVEPOINT {FLUSH_SAVEPOINT};"))?;
            apply_all(&conn, pending).and_then(|affected| {
                conn.execute_batch(&format!("RELEASE {FLUSH_SAVEPOINT};"))?;
                Ok((affected, pending.len()))
            })
        };

        match outcome {
            Ok((affected, changes)) => {
                self.tracker.borrow_mut().accept_all();
                info!(
                    "event=store_flush module=store status=ok changes={} affected={} duration_ms={}",
                    changes,
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                if let Err(rollback_err) = conn.execute_batch(&format!(
                    "ROLLBACK TO {FLUSH_SAVEPOINT}; RELEASE {FLUSH_SAVEPOINT};"
                )) {
                    warn!(
                        "event=store_flush module=store status=rollback_failed error={}",
                        rollback_err
                    );
                }
                error!(
                    "event=store_flush module=store status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Runs `f` against the raw connection.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> StoreResult<R> {
        let conn = self.connection()?;
        Ok(f(&*conn)?)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.borrow().is_none()
    }

    /// Closes the connection and forgets tracked state. Idempotent.
    ///
    /// An explicit transaction still open at this point is rolled back by
    /// SQLite.
    pub fn close(&self) -> StoreResult<()> {
        let Some(conn) = self.conn.borrow_mut().take() else {
            return Ok(());
        };
        self.tracker.borrow_mut().clear();
        if self.active_transaction.take().is_some() {
            warn!("event=store_close module=store status=open_transaction_discarded");
        }

        match conn.close() {
            Ok(()) => {
                info!("event=store_close module=store status=ok mode={}", self.mode);
                Ok(())
            }
            Err((_conn, err)) => {
                error!(
                    "event=store_close module=store status=error mode={} error={}",
                    self.mode, err
                );
                Err(err.into())
            }
        }
    }

    pub(crate) fn connection(&self) -> StoreResult<Ref<'_, Connection>> {
        Ref::filter_map(self.conn.borrow(), Option::as_ref).map_err(|_| StoreError::Closed)
    }

    pub(crate) fn attach_all<T: Entity>(&self, items: &[T]) {
        let mut tracker = self.tracker.borrow_mut();
        for item in items {
            tracker.attach(T::TABLE, &item.key());
        }
    }

    pub(crate) fn active_transaction(&self) -> Option<Uuid> {
        self.active_transaction.get()
    }

    pub(crate) fn set_active_transaction(&self, id: Option<Uuid>) {
        self.active_transaction.set(id);
    }

    fn stage<T: Entity>(&self, state: EntityState, entity: &T) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        if state != EntityState::Deleted {
            let produced = entity.values().len();
            if produced != T::COLUMNS.len() {
                return Err(StoreError::InvalidConfig(format!(
                    "entity for `{}` produced {produced} values for {} columns",
                    T::TABLE,
                    T::COLUMNS.len()
                )));
            }
        }

        self.tracker.borrow_mut().stage(state, entity);
        debug!(
            "event=store_stage module=store status=ok table={} state={} key={}",
            T::TABLE,
            state.as_str(),
            key_text(&entity.key())
        );
        Ok(())
    }

    fn stage_range<'e, T, I>(&self, state: EntityState, entities: I) -> StoreResult<usize>
    where
        T: Entity,
        I: IntoIterator<Item = &'e T>,
    {
        let mut staged = 0;
        for entity in entities {
            self.stage(state, entity)?;
            staged += 1;
        }
        Ok(staged)
    }
}

fn apply_all(conn: &Connection, pending: &[PendingChange]) -> StoreResult<usize> {
    let mut affected = 0;
    for change in pending {
        affected += apply_change(conn, change)?;
    }
    Ok(affected)
}

fn apply_change(conn: &Connection, change: &PendingChange) -> StoreResult<usize> {
    let changed = match change.state {
        EntityState::Added => {
            let placeholders = vec!["?"; change.columns.len()].join(", ");
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders});",
                    change.table,
                    change.columns.join(", ")
                ),
                params_from_iter(change.values.iter()),
            )?
        }
        EntityState::Modified => {
            let mut assignments = Vec::new();
            let mut bind_values: Vec<&Value> = Vec::new();
            for (column, value) in change.columns.iter().zip(&change.values) {
                if *column == change.key_column {
                    continue;
                }
                assignments.push(format!("{column} = ?"));
                bind_values.push(value);
            }
            if assignments.is_empty() {
                // Key-only rows have nothing to set; the row must still exist.
                let found: i64 = conn.query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} WHERE {} = ?;",
                        change.table, change.key_column
                    ),
                    [&change.key],
                    |row| row.get(0),
                )?;
                usize::try_from(found).unwrap_or_default()
            } else {
                bind_values.push(&change.key);
                conn.execute(
                    &format!(
                        "UPDATE {} SET {} WHERE {} = ?;",
                        change.table,
                        assignments.join(", "),
                        change.key_column
                    ),
                    params_from_iter(bind_values),
                )?
            }
        }
        EntityState::Deleted => conn.execute(
            &format!(
                "DELETE FROM {} WHERE {} = ?;",
                change.table, change.key_column
            ),
            [&change.key],
        )?,
    };

    if changed == 0 && change.state != EntityState::Added {
        return Err(StoreError::Concurrency {
            table: change.table,
            key: key_text(&change.key),
        });
    }

    Ok(changed)
}
