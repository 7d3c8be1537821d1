use super::session::{RepositoryCache, Session};
use super::UowResult;
use crate::repo::Repository;
use crate::store::{DbContext, Entity};
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Context-agnostic unit-of-work surface.
///
/// Key-based factory lookups hand out `Rc<dyn UnitOfWork>`;
/// repositories are still reachable through
/// [`get_repository`](#method.get_repository) on the trait object.
pub trait UnitOfWork {
    /// Session id used in log events.
    fn id(&self) -> Uuid;

    /// Short type name of the owned context.
    fn context_name(&self) -> &'static str;

    /// Begins an explicit transaction unless one is already open.
    fn open_transaction(&self) -> UowResult<()>;

    /// Flushes staged changes; returns the number of affected rows.
    ///
    /// With an open transaction, commits it on success or rolls it back
    /// on failure, then disposes. Failures are returned unchanged.
    fn commit(&self) -> UowResult<usize>;

    fn dispose(&self);

    fn is_disposed(&self) -> bool;

    fn has_open_transaction(&self) -> bool;

    #[doc(hidden)]
    fn repository_cache(&self) -> &RepositoryCache;

    #[doc(hidden)]
    fn erased_context(&self) -> UowResult<Weak<dyn DbContext>>;
}

impl dyn UnitOfWork + '_ {
    /// Cached repository for `T`, created on first request.
    pub fn get_repository<T: Entity>(&self) -> UowResult<Rc<Repository<T>>> {
        let context = self.erased_context()?;
        Ok(self
            .repository_cache()
            .get_or_insert_with(|| Repository::new(context)))
    }
}

/// Unit of work bound to one typed context.
pub struct ContextUnitOfWork<C: DbContext> {
    session: Session<C>,
}

impl<C: DbContext> ContextUnitOfWork<C> {
    /// Takes ownership of `context` until disposal.
    pub fn new(context: C) -> Self {
        Self {
            session: Session::new(context),
        }
    }

    /// Shared handle to the owned context, e.g. for raw store access.
    pub fn context(&self) -> UowResult<Rc<C>> {
        self.session.context()
    }

    pub fn get_repository<T: Entity>(&self) -> UowResult<Rc<Repository<T>>> {
        self.session.get_repository()
    }

    /// Number of repositories created so far.
    pub fn repository_count(&self) -> usize {
        self.session.repositories().len()
    }
}

impl<C: DbContext> UnitOfWork for ContextUnitOfWork<C> {
    fn id(&self) -> Uuid {
        self.session.id()
    }

    fn context_name(&self) -> &'static str {
        self.session.name()
    }

    fn open_transaction(&self) -> UowResult<()> {
        self.session.open_transaction()
    }

    fn commit(&self) -> UowResult<usize> {
        self.session.commit()
    }

    fn dispose(&self) {
        self.session.dispose();
    }

    fn is_disposed(&self) -> bool {
        self.session.is_disposed()
    }

    fn has_open_transaction(&self) -> bool {
        self.session.has_open_transaction()
    }

    fn repository_cache(&self) -> &RepositoryCache {
        self.session.repositories()
    }

    fn erased_context(&self) -> UowResult<Weak<dyn DbContext>> {
        self.session.erased_context()
    }
}
