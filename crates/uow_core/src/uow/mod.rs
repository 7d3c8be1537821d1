//! Unit of work over one owned context.
//!
//! # Responsibility
//! - Own one context for the lifetime of the unit of work and hand out
//!   one cached repository per entity type.
//! - Coordinate the optional explicit transaction around `commit`.
//! - Provide the single-schema workspace variant on the same machinery.
//!
//! # Invariants
//! - `open_transaction` is idempotent.
//! - A commit with an open transaction ends disposed, on success and on
//!   failure; a failed flush is rolled back before disposal and its
//!   error is returned unchanged.
//! - Disposal releases the transaction before the context and is safe to
//!   repeat.

use crate::repo::RepoError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod session;
mod unit_of_work;
mod workspace;

pub use session::RepositoryCache;
pub use unit_of_work::{ContextUnitOfWork, UnitOfWork};
pub use workspace::{UnitOfWorkspace, WorkspaceContext};

pub type UowResult<T> = Result<T, UowError>;

#[derive(Debug)]
pub enum UowError {
    /// The unit of work has released its context.
    Disposed,
    /// Failure from the store, carried unchanged.
    Persistence(StoreError),
}

impl UowError {
    /// The underlying store failure, when there is one.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Persistence(err) => Some(err),
            Self::Disposed => None,
        }
    }
}

impl Display for UowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposed => write!(f, "unit of work has been disposed"),
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            Self::Disposed => None,
        }
    }
}

impl From<StoreError> for UowError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value)
    }
}

impl From<UowError> for RepoError {
    fn from(value: UowError) -> Self {
        match value {
            UowError::Disposed => Self::Disposed,
            UowError::Persistence(err) => Self::Store(err),
        }
    }
}
