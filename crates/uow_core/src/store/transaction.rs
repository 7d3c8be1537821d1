//! Explicit transaction handle.
//!
//! # Invariants
//! - Only an `Open` handle can commit or roll back.
//! - A failed commit leaves the handle `Open` so it can still roll back.
//! - Disposing an `Open` handle rolls it back.

use super::engine::Store;
use super::{StoreError, StoreResult};
use log::{info, warn};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
    Disposed,
}

/// Handle for one `BEGIN ... COMMIT|ROLLBACK` span on a store.
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    state: TransactionState,
    started_at: Instant,
}

impl Store {
    /// Begins an explicit transaction.
    ///
    /// # Errors
    /// - `TransactionAlreadyActive` when this store already has one open.
    pub fn begin_transaction(&self) -> StoreResult<Transaction> {
        if self.active_transaction().is_some() {
            return Err(StoreError::TransactionAlreadyActive);
        }

        self.connection()?.execute_batch("BEGIN DEFERRED;")?;
        let id = Uuid::new_v4();
        self.set_active_transaction(Some(id));
        info!("event=tx_begin module=store status=ok tx={id}");

        Ok(Transaction {
            id,
            state: TransactionState::Open,
            started_at: Instant::now(),
        })
    }
}

impl Transaction {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    pub fn commit(&mut self, store: &Store) -> StoreResult<()> {
        self.finish(store, "COMMIT;", TransactionState::Committed)
    }

    pub fn rollback(&mut self, store: &Store) -> StoreResult<()> {
        self.finish(store, "ROLLBACK;", TransactionState::RolledBack)
    }

    /// Releases the handle, rolling back first when still open.
    pub fn dispose(mut self, store: &Store) -> StoreResult<()> {
        let result = if self.is_open() && store.active_transaction() == Some(self.id) {
            self.rollback(store)
        } else {
            Ok(())
        };
        self.state = TransactionState::Disposed;
        result
    }

    fn finish(&mut self, store: &Store, sql: &str, next: TransactionState) -> StoreResult<()> {
        if !self.is_open() || store.active_transaction() != Some(self.id) {
            return Err(StoreError::TransactionNotActive);
        }

        if let Err(err) = store.connection()?.execute_batch(sql) {
            warn!(
                "event=tx_finish module=store status=error tx={} target={:?} error={}",
                self.id, next, err
            );
            return Err(err.into());
        }

        store.set_active_transaction(None);
        self.state = next;
        info!(
            "event=tx_finish module=store status=ok tx={} outcome={:?} duration_ms={}",
            self.id,
            next,
            self.started_at.elapsed().as_millis()
        );
        Ok(())
    }
}
