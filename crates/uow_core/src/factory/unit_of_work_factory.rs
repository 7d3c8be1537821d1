use super::container::ServiceScope;
use super::registry::{ContextRegistry, ContextType};
use super::FactoryResult;
use crate::store::DbContext;
use crate::uow::{ContextUnitOfWork, UnitOfWork};
use log::{debug, warn};
use std::rc::Rc;
use std::sync::Arc;

/// Resolves units of work by registry key or by context type.
///
/// The registry is shared process-wide; the factory itself lives as long
/// as its scope, so callers in different scopes get independent units of
/// work.
pub struct UnitOfWorkFactory {
    registry: Arc<ContextRegistry>,
    scope: Rc<ServiceScope>,
}

impl UnitOfWorkFactory {
    pub fn new(registry: Arc<ContextRegistry>, scope: Rc<ServiceScope>) -> Self {
        Self { registry, scope }
    }

    /// Maps `key` to `context` in the shared registry.
    pub fn register(&self, key: &str, context: ContextType) -> FactoryResult<()> {
        self.registry.register(key, context)
    }

    /// Unit of work for the context registered under `key`.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank key.
    /// - `UnknownContext` when `key` is not registered.
    /// - `ResolutionFailure` when the context has no container binding.
    /// - `Persistence` when opening the context fails.
    pub fn get_unit_of_work(&self, key: &str) -> FactoryResult<Rc<dyn UnitOfWork>> {
        let key = key.trim();
        let context = match self.registry.lookup(key) {
            Ok(context) => context,
            Err(err) => {
                warn!(
                    "event=factory_resolve module=factory status=error key={} error={}",
                    key, err
                );
                return Err(err);
            }
        };

        let unit_of_work = self.scope.resolve_erased(context, Some(key))?;
        debug!(
            "event=factory_resolve module=factory status=ok key={} context={} uow={}",
            key,
            context.name(),
            unit_of_work.id()
        );
        Ok(unit_of_work)
    }

    /// Unit of work for context type `C`, registered under a key or not.
    pub fn get_unit_of_work_for<C: DbContext>(&self) -> FactoryResult<Rc<ContextUnitOfWork<C>>> {
        self.scope.resolve::<C>()
    }

    /// Whether `key` is registered; blank keys never are.
    pub fn has_context(&self, key: &str) -> bool {
        self.registry.contains(key)
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }
}
