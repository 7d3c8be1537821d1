use super::{UowError, UowResult};
use crate::repo::Repository;
use crate::store::{DbContext, Entity, Transaction};
use log::{debug, error, info, warn};
use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RepositoryKey {
    entity: TypeId,
    implementation: &'static str,
}

impl RepositoryKey {
    fn of<T: Entity>() -> Self {
        Self {
            entity: TypeId::of::<T>(),
            implementation: type_name::<Repository<T>>(),
        }
    }
}

/// Identity map of repositories owned by one unit of work.
#[derive(Default)]
pub struct RepositoryCache {
    entries: RefCell<HashMap<RepositoryKey, Rc<dyn Any>>>,
}

impl RepositoryCache {
    /// Cached repository for `T`, building it with `create` on first use.
    pub(crate) fn get_or_insert_with<T: Entity>(
        &self,
        create: impl FnOnce() -> Repository<T>,
    ) -> Rc<Repository<T>> {
        let key = RepositoryKey::of::<T>();
        if let Some(existing) = self.entries.borrow().get(&key) {
            if let Ok(repository) = Rc::clone(existing).downcast::<Repository<T>>() {
                return repository;
            }
        }

        let repository = Rc::new(create());
        let erased: Rc<dyn Any> = repository.clone();
        self.entries.borrow_mut().insert(key, erased);
        debug!(
            "event=repo_cache module=uow status=created table={}",
            T::TABLE
        );
        repository
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

/// Lifecycle shared by every unit-of-work flavour.
pub(crate) struct Session<C: DbContext> {
    id: Uuid,
    name: &'static str,
    context: RefCell<Option<Rc<C>>>,
    repositories: RepositoryCache,
    transaction: RefCell<Option<Transaction>>,
}

impl<C: DbContext> Session<C> {
    pub fn new(context: C) -> Self {
        let id = Uuid::new_v4();
        let name = context.name();
        info!("event=uow_create module=uow status=ok uow={id} context={name}");
        Self {
            id,
            name,
            context: RefCell::new(Some(Rc::new(context))),
            repositories: RepositoryCache::default(),
            transaction: RefCell::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn context(&self) -> UowResult<Rc<C>> {
        self.context.borrow().clone().ok_or(UowError::Disposed)
    }

    pub fn erased_context(&self) -> UowResult<Weak<dyn DbContext>> {
        let context = self.context()?;
        let weak: Weak<C> = Rc::downgrade(&context);
        let erased: Weak<dyn DbContext> = weak;
        Ok(erased)
    }

    pub fn repositories(&self) -> &RepositoryCache {
        &self.repositories
    }

    pub fn get_repository<T: Entity>(&self) -> UowResult<Rc<Repository<T>>> {
        let context = self.erased_context()?;
        Ok(self
            .repositories
            .get_or_insert_with(|| Repository::new(context)))
    }

    pub fn open_transaction(&self) -> UowResult<()> {
        let context = self.context()?;
        let mut slot = self.transaction.borrow_mut();
        if slot.as_ref().is_some_and(Transaction::is_open) {
            debug!(
                "event=uow_open_tx module=uow status=skip uow={} reason=already_open",
                self.id
            );
            return Ok(());
        }

        let transaction = context.store().begin_transaction()?;
        info!(
            "event=uow_open_tx module=uow status=ok uow={} tx={}",
            self.id,
            transaction.id()
        );
        *slot = Some(transaction);
        Ok(())
    }

    pub fn has_open_transaction(&self) -> bool {
        self.transaction
            .borrow()
            .as_ref()
            .is_some_and(Transaction::is_open)
    }

    /// Flushes staged changes and settles the open transaction, if any.
    ///
    /// Without a transaction a failed flush leaves the unit of work
    /// usable; with one, the unit of work is disposed either way.
    pub fn commit(&self) -> UowResult<usize> {
        let started_at = Instant::now();
        let context = self.context()?;
        let store = context.store();
        let flushed = store.save_changes();
        let transaction = self.transaction.borrow_mut().take();

        let Some(mut transaction) = transaction else {
            return match flushed {
                Ok(affected) => {
                    info!(
                        "event=uow_commit module=uow status=ok uow={} tx=none affected={} duration_ms={}",
                        self.id,
                        affected,
                        started_at.elapsed().as_millis()
                    );
                    Ok(affected)
                }
                Err(err) => {
                    error!(
                        "event=uow_commit module=uow status=error uow={} tx=none error={}",
                        self.id, err
                    );
                    Err(err.into())
                }
            };
        };

        let outcome = flushed.and_then(|affected| {
            transaction.commit(store)?;
            Ok(affected)
        });

        match outcome {
            Ok(affected) => {
                info!(
                    "event=uow_commit module=uow status=ok uow={} tx={} affected={} duration_ms={}",
                    self.id,
                    transaction.id(),
                    affected,
                    started_at.elapsed().as_millis()
                );
                drop(context);
                self.dispose();
                Ok(affected)
            }
            Err(err) => {
                let tx_id = transaction.id();
                if let Err(rollback_err) = transaction.rollback(store) {
                    warn!(
                        "event=uow_rollback module=uow status=error uow={} tx={} error={}",
                        self.id, tx_id, rollback_err
                    );
                }
                error!(
                    "event=uow_commit module=uow status=error uow={} tx={} duration_ms={} error={}",
                    self.id,
                    tx_id,
                    started_at.elapsed().as_millis(),
                    err
                );
                drop(context);
                self.dispose();
                Err(err.into())
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.context.borrow().is_none()
    }

    /// Releases the transaction, the repositories and the context, in
    /// that order. Repeated calls do nothing.
    pub fn dispose(&self) {
        let Some(context) = self.context.borrow_mut().take() else {
            return;
        };
        let store = context.store();

        if let Some(transaction) = self.transaction.borrow_mut().take() {
            let tx_id = transaction.id();
            if let Err(err) = transaction.dispose(store) {
                warn!(
                    "event=uow_dispose module=uow status=tx_error uow={} tx={} error={}",
                    self.id, tx_id, err
                );
            }
        }
        self.repositories.clear();

        match store.close() {
            Ok(()) => info!(
                "event=uow_dispose module=uow status=ok uow={} context={}",
                self.id, self.name
            ),
            Err(err) => warn!(
                "event=uow_dispose module=uow status=close_error uow={} context={} error={}",
                self.id, self.name, err
            ),
        }
    }
}

impl<C: DbContext> Drop for Session<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}
