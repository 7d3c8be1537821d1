use super::{FactoryError, FactoryResult};
use crate::store::{short_type_name, DbContext};
use log::{info, warn};
use once_cell::sync::Lazy;
use std::any::{type_name, TypeId};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

static GLOBAL_REGISTRY: Lazy<Arc<ContextRegistry>> = Lazy::new(|| Arc::new(ContextRegistry::new()));

/// Runtime tag for a context type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextType {
    id: TypeId,
    name: &'static str,
}

impl ContextType {
    pub fn of<C: DbContext>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: short_type_name(type_name::<C>()),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Short type name, e.g. `AccountContext`.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Debug for ContextType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContextType({})", self.name)
    }
}

/// Key -> context-type map shared by every factory in a process.
///
/// Populated at startup; read concurrently afterwards.
#[derive(Default)]
pub struct ContextRegistry {
    entries: RwLock<BTreeMap<String, ContextType>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry, created on first use.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Maps `key` to `context`.
    ///
    /// # Errors
    /// - `InvalidArgument` when `key` is blank.
    /// - `DuplicateKey` when `key` is already mapped, to any type.
    pub fn register(&self, key: &str, context: ContextType) -> FactoryResult<()> {
        let key = normalize_key(key)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(key) {
            warn!(
                "event=registry_register module=factory status=duplicate key={} existing={} requested={}",
                key,
                existing.name(),
                context.name()
            );
            return Err(FactoryError::DuplicateKey {
                key: key.to_string(),
                existing: existing.name(),
            });
        }

        entries.insert(key.to_string(), context);
        info!(
            "event=registry_register module=factory status=ok key={} context={}",
            key,
            context.name()
        );
        Ok(())
    }

    pub fn register_context<C: DbContext>(&self, key: &str) -> FactoryResult<()> {
        self.register(key, ContextType::of::<C>())
    }

    /// Context type mapped to `key`.
    ///
    /// # Errors
    /// - `InvalidArgument` when `key` is blank.
    /// - `UnknownContext`, listing the registered keys, when unmapped.
    pub fn lookup(&self, key: &str) -> FactoryResult<ContextType> {
        let key = normalize_key(key)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .copied()
            .ok_or_else(|| FactoryError::UnknownContext {
                key: key.to_string(),
                available: entries.keys().cloned().collect(),
            })
    }

    /// Blank keys are never present.
    pub fn contains(&self, key: &str) -> bool {
        let key = key.trim();
        !key.is_empty()
            && self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Copy of the current mapping, for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<String, ContextType> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_key(key: &str) -> FactoryResult<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(FactoryError::InvalidArgument(
            "context key cannot be empty".to_string(),
        ));
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::{ContextRegistry, ContextType};
    use crate::factory::FactoryError;
    use crate::store::{DbContext, Store};
    use std::sync::Arc;
    use std::thread;

    struct AccountContext {
        store: Store,
    }

    impl DbContext for AccountContext {
        fn store(&self) -> &Store {
            &self.store
        }
    }

    struct CatalogContext {
        store: Store,
    }

    impl DbContext for CatalogContext {
        fn store(&self) -> &Store {
            &self.store
        }
    }

    #[test]
    fn keys_are_trimmed_and_sorted() {
        let registry = ContextRegistry::new();
        registry
            .register_context::<CatalogContext>("  catalog ")
            .expect("catalog should register");
        registry
            .register_context::<AccountContext>("account")
            .expect("account should register");

        assert_eq!(registry.keys(), vec!["account", "catalog"]);
        assert!(registry.contains(" catalog"));
        assert_eq!(
            registry.lookup("catalog").expect("lookup"),
            ContextType::of::<CatalogContext>()
        );
    }

    #[test]
    fn same_type_under_same_key_is_still_a_duplicate() {
        let registry = ContextRegistry::new();
        registry
            .register_context::<AccountContext>("account")
            .expect("first registration");

        let err = registry
            .register_context::<AccountContext>("account")
            .expect_err("duplicate must fail");
        match err {
            FactoryError::DuplicateKey { key, existing } => {
                assert_eq!(key, "account");
                assert_eq!(existing, "AccountContext");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn blank_keys_are_rejected_or_absent() {
        let registry = ContextRegistry::new();
        assert!(matches!(
            registry.register_context::<AccountContext>("   "),
            Err(FactoryError::InvalidArgument(_))
        ));
        assert!(!registry.contains(""));
        assert!(matches!(
            registry.lookup(" "),
            Err(FactoryError::InvalidArgument(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration_admits_one_winner_per_key() {
        let registry = Arc::new(ContextRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.register_context::<AccountContext>("shared").is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should finish"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.snapshot().len(), 1);
    }
}
