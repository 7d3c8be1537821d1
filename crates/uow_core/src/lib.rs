//! Repository, unit-of-work and pagination layer over SQLite contexts.
//! Applications with several schemas resolve the right unit of work
//! through a keyed factory; single-schema applications use the
//! workspace variant.

pub mod config;
pub mod factory;
pub mod logging;
pub mod paging;
pub mod repo;
pub mod store;
pub mod uow;

pub use config::{StoreOptions, StoreSource};
pub use factory::{
    ContextRegistry, ContextType, FactoryError, FactoryResult, ServiceCollection, ServiceProvider,
    ServiceScope, UnitOfWorkFactory,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use paging::{
    paginate, paginate_with, DataTableResponse, Page, PageError, PageRequest, PageSource,
};
pub use repo::{Criteria, RepoError, RepoResult, Repository};
pub use store::{
    DbContext, Entity, EntityState, Filter, Include, Migration, Query, Store, StoreError,
    StoreResult,
};
pub use uow::{
    ContextUnitOfWork, UnitOfWork, UnitOfWorkspace, UowError, UowResult, WorkspaceContext,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
