use super::session::{RepositoryCache, Session};
use super::unit_of_work::UnitOfWork;
use super::UowResult;
use crate::config::StoreOptions;
use crate::repo::Repository;
use crate::store::{DbContext, Entity, Migration, Store, StoreResult};
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Fixed context for single-schema applications, opened from a
/// connection string.
pub struct WorkspaceContext {
    store: Store,
    connection_string: String,
}

impl WorkspaceContext {
    /// Opens the store described by `connection_string` and applies
    /// `migrations`.
    pub fn open(connection_string: &str, migrations: &[Migration]) -> StoreResult<Self> {
        let options = StoreOptions::from_connection_string(connection_string)?;
        Ok(Self {
            store: Store::open(&options, migrations)?,
            connection_string: connection_string.trim().to_string(),
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl DbContext for WorkspaceContext {
    fn store(&self) -> &Store {
        &self.store
    }
}

/// Unit of work over a [`WorkspaceContext`].
///
/// Same lifecycle as [`ContextUnitOfWork`](super::ContextUnitOfWork); the
/// handle is confined to the thread that created it.
pub struct UnitOfWorkspace {
    session: Session<WorkspaceContext>,
}

impl UnitOfWorkspace {
    pub fn new(context: WorkspaceContext) -> Self {
        Self {
            session: Session::new(context),
        }
    }

    /// Opens a workspace context and wraps it.
    pub fn open(connection_string: &str, migrations: &[Migration]) -> UowResult<Self> {
        Ok(Self::new(WorkspaceContext::open(
            connection_string,
            migrations,
        )?))
    }

    pub fn context(&self) -> UowResult<Rc<WorkspaceContext>> {
        self.session.context()
    }

    pub fn get_repository<T: Entity>(&self) -> UowResult<Rc<Repository<T>>> {
        self.session.get_repository()
    }
}

impl UnitOfWork for UnitOfWorkspace {
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

#[cfg(test)]
mod tests {
    use super::{UnitOfWorkspace, WorkspaceContext};
    use crate::store::{Migration, StoreError};
    use crate::uow::{UnitOfWork, UowError};

    const SCHEMA: &[Migration] = &[Migration::new(1, "CREATE TABLE kv (k TEXT PRIMARY KEY);")];

    #[test]
    fn workspace_opens_from_connection_string() {
        let uow = UnitOfWorkspace::open("Data Source=:memory:; Foreign Keys=on", SCHEMA)
            .expect("workspace should open");
        let context = uow.context().expect("context");

        assert_eq!(context.connection_string(), "Data Source=:memory:; Foreign Keys=on");
        assert_eq!(uow.context_name(), "WorkspaceContext");
        uow.open_transaction().expect("transaction should open");
        assert!(uow.has_open_transaction());
    }

    #[test]
    fn malformed_connection_string_is_a_persistence_error() {
        let err = UnitOfWorkspace::open("Server=localhost", SCHEMA)
            .err()
            .expect("unknown key must fail");
        assert!(matches!(
            err,
            UowError::Persistence(StoreError::InvalidConfig(_))
        ));
        assert!(WorkspaceContext::open("", SCHEMA).is_err());
    }
}
