//! Minimal scoped container for units of work.
//!
//! # Responsibility
//! - Record, per context type, how to open the context.
//! - Build one unit of work per context type per scope, on demand.
//!
//! # Invariants
//! - Bindings are immutable once the provider is built.
//! - Dropping a scope drops its units of work, which disposes them once
//!   no caller still holds one.

use super::registry::{ContextRegistry, ContextType};
use super::unit_of_work_factory::UnitOfWorkFactory;
use super::{FactoryError, FactoryResult};
use crate::store::{DbContext, StoreResult};
use crate::uow::{ContextUnitOfWork, UnitOfWork};
use log::{debug, info};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

type Construct = dyn Fn() -> StoreResult<Rc<dyn Any>> + Send + Sync;

struct Binding {
    context: ContextType,
    construct: Arc<Construct>,
    erase: fn(Rc<dyn Any>) -> Option<Rc<dyn UnitOfWork>>,
}

impl Binding {
    fn new<C, F>(open: F) -> Self
    where
        C: DbContext,
        F: Fn() -> StoreResult<C> + Send + Sync + 'static,
    {
        Self {
            context: ContextType::of::<C>(),
            construct: Arc::new(move || {
                let unit_of_work: Rc<dyn Any> = Rc::new(ContextUnitOfWork::new(open()?));
                Ok(unit_of_work)
            }),
            erase: erase_unit_of_work::<C>,
        }
    }
}

fn erase_unit_of_work<C: DbContext>(instance: Rc<dyn Any>) -> Option<Rc<dyn UnitOfWork>> {
    let typed: Rc<dyn UnitOfWork> = instance.downcast::<ContextUnitOfWork<C>>().ok()?;
    Some(typed)
}

/// Startup-time list of unit-of-work bindings.
pub struct ServiceCollection {
    registry: Arc<ContextRegistry>,
    bindings: HashMap<TypeId, Binding>,
}

impl ServiceCollection {
    /// Keyed registrations go into `registry`.
    pub fn new(registry: Arc<ContextRegistry>) -> Self {
        Self {
            registry,
            bindings: HashMap::new(),
        }
    }

    /// Binds `ContextUnitOfWork<C>`, opening contexts with `open`.
    ///
    /// Binding the same context type again replaces the earlier binding.
    pub fn add_unit_of_work<C, F>(&mut self, open: F) -> &mut Self
    where
        C: DbContext,
        F: Fn() -> StoreResult<C> + Send + Sync + 'static,
    {
        let binding = Binding::new::<C, F>(open);
        debug!(
            "event=container_bind module=factory status=ok context={}",
            binding.context.name()
        );
        self.bindings.insert(TypeId::of::<C>(), binding);
        self
    }

    /// Binds like [`ServiceCollection::add_unit_of_work`] and maps `key` to
    /// `C` in the registry.
    ///
    /// # Errors
    /// - `InvalidArgument` for a blank key, `DuplicateKey` for a taken one.
    ///   Nothing is bound in either case.
    pub fn add_keyed_unit_of_work<C, F>(&mut self, key: &str, open: F) -> FactoryResult<&mut Self>
    where
        C: DbContext,
        F: Fn() -> StoreResult<C> + Send + Sync + 'static,
    {
        self.registry.register_context::<C>(key)?;
        Ok(self.add_unit_of_work::<C, F>(open))
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn build(self) -> ServiceProvider {
        info!(
            "event=container_build module=factory status=ok bindings={} registered_keys={}",
            self.bindings.len(),
            self.registry.len()
        );
        ServiceProvider {
            registry: self.registry,
            bindings: Arc::new(self.bindings),
        }
    }
}

/// Immutable set of bindings; cheap to clone and share across threads.
#[derive(Clone)]
pub struct ServiceProvider {
    registry: Arc<ContextRegistry>,
    bindings: Arc<HashMap<TypeId, Binding>>,
}

impl ServiceProvider {
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn is_bound<C: DbContext>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<C>())
    }

    /// Starts a scope, e.g. one per request.
    pub fn create_scope(&self) -> Rc<ServiceScope> {
        let scope = ServiceScope {
            id: Uuid::new_v4(),
            registry: Arc::clone(&self.registry),
            bindings: Arc::clone(&self.bindings),
            resolved: RefCell::new(HashMap::new()),
        };
        debug!("event=scope_create module=factory status=ok scope={}", scope.id);
        Rc::new(scope)
    }
}

/// Per-request resolution scope.
pub struct ServiceScope {
    id: Uuid,
    registry: Arc<ContextRegistry>,
    bindings: Arc<HashMap<TypeId, Binding>>,
    resolved: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl ServiceScope {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Scope-cached unit of work for `C`.
    ///
    /// # Errors
    /// - `ResolutionFailure` when `C` has no binding.
    /// - `Persistence` when opening the context fails.
    pub fn resolve<C: DbContext>(&self) -> FactoryResult<Rc<ContextUnitOfWork<C>>> {
        let context = ContextType::of::<C>();
        self.resolve_any(context, None)?
            .downcast::<ContextUnitOfWork<C>>()
            .map_err(|_| FactoryError::ResolutionFailure {
                context: context.name(),
                key: None,
            })
    }

    /// Scope-cached unit of work for a runtime context tag.
    pub fn resolve_erased(
        &self,
        context: ContextType,
        key: Option<&str>,
    ) -> FactoryResult<Rc<dyn UnitOfWork>> {
        let binding = self.binding(context, key)?;
        let instance = self.resolve_any(context, key)?;
        (binding.erase)(instance).ok_or_else(|| FactoryError::ResolutionFailure {
            context: context.name(),
            key: key.map(str::to_string),
        })
    }

    /// Factory over this scope and the provider's registry.
    pub fn factory(self: &Rc<Self>) -> UnitOfWorkFactory {
        UnitOfWorkFactory::new(Arc::clone(&self.registry), Rc::clone(self))
    }

    /// Number of units of work created in this scope.
    pub fn resolved_count(&self) -> usize {
        self.resolved.borrow().len()
    }

    fn binding(&self, context: ContextType, key: Option<&str>) -> FactoryResult<&Binding> {
        self.bindings
            .get(&context.id())
            .ok_or_else(|| FactoryError::ResolutionFailure {
                context: context.name(),
                key: key.map(str::to_string),
            })
    }

    fn resolve_any(&self, context: ContextType, key: Option<&str>) -> FactoryResult<Rc<dyn Any>> {
        if let Some(existing) = self.resolved.borrow().get(&context.id()) {
            return Ok(Rc::clone(existing));
        }

        let binding = self.binding(context, key)?;
        let instance = (binding.construct)()?;
        self.resolved
            .borrow_mut()
            .insert(context.id(), Rc::clone(&instance));
        info!(
            "event=scope_resolve module=factory status=created scope={} context={}",
            self.id,
            context.name()
        );
        Ok(instance)
    }
}
