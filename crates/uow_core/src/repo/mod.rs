//! Per-entity repositories.
//!
//! # Responsibility
//! - Sequence read pipelines as include -> filter -> order -> project ->
//!   paginate without interpreting the directives themselves.
//! - Stage writes on the owning context's change tracker.
//!
//! # Invariants
//! - A repository never owns its context; use after the owning unit of
//!   work is disposed fails with `RepoError::Disposed`.
//! - Writes are staged only; flushing belongs to the unit of work.

use crate::paging::PageError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod criteria;
mod repository;

pub use criteria::{Criteria, QueryShaper};
pub use repository::Repository;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// The owning unit of work released its context.
    Disposed,
    InvalidArgument(String),
    /// Persistence failure, carried unchanged.
    Store(StoreError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disposed => write!(f, "repository context has been disposed"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Disposed | Self::InvalidArgument(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<PageError<StoreError>> for RepoError {
    fn from(value: PageError<StoreError>) -> Self {
        match value {
            PageError::InvalidArgument { .. } => Self::InvalidArgument(value.to_string()),
            PageError::Source(err) => Self::Store(err),
        }
    }
}
