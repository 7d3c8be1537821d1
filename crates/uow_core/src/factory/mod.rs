//! Multi-context unit-of-work resolution.
//!
//! # Responsibility
//! - Keep the process-wide key -> context-type registry.
//! - Bind context types to unit-of-work constructors and resolve them
//!   once per scope.
//! - Resolve units of work by registry key or by context type.
//!
//! # Invariants
//! - Registry keys are trimmed, non-blank and unique; a duplicate key is
//!   rejected even when it names the same context type.
//! - Registration is serialised; readers never see a partial entry.
//! - A scope hands out one unit of work per context type.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod container;
mod registry;
mod unit_of_work_factory;

pub use container::{ServiceCollection, ServiceProvider, ServiceScope};
pub use registry::{ContextRegistry, ContextType};
pub use unit_of_work_factory::UnitOfWorkFactory;

pub type FactoryResult<T> = Result<T, FactoryError>;

#[derive(Debug)]
pub enum FactoryError {
    InvalidArgument(String),
    DuplicateKey {
        key: String,
        existing: &'static str,
    },
    UnknownContext {
        key: String,
        available: Vec<String>,
    },
    /// The registry knows the context but no unit of work is bound for it.
    ResolutionFailure {
        context: &'static str,
        key: Option<String>,
    },
    /// Opening the context's store failed.
    Persistence(StoreError),
}

impl Display for FactoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::DuplicateKey { key, existing } => write!(
                f,
                "context key `{key}` is already registered; existing context: {existing}"
            ),
            Self::UnknownContext { key, available } => {
                let available = if available.is_empty() {
                    "none".to_string()
                } else {
                    available
                        .iter()
                        .map(|key| format!("`{key}`"))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(
                    f,
                    "no context registered for key `{key}`; available: {available}"
                )
            }
            Self::ResolutionFailure { context, key } => {
                write!(f, "no unit of work bound for context {context}")?;
                if let Some(key) = key {
                    write!(f, " (key `{key}`)")?;
                }
                Ok(())
            }
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FactoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for FactoryError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value)
    }
}
