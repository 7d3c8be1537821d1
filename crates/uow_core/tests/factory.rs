mod common;

use common::{AccountContext, CatalogContext, Customer, Product};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use uow_core::{
    ContextRegistry, ContextType, FactoryError, ServiceCollection, ServiceProvider, StoreError,
    UnitOfWork,
};

fn provider(registry: &Arc<ContextRegistry>) -> ServiceProvider {
    let mut services = ServiceCollection::new(Arc::clone(registry));
    services
        .add_keyed_unit_of_work::<AccountContext, _>("account", AccountContext::in_memory)
        .unwrap()
        .add_keyed_unit_of_work::<CatalogContext, _>("catalog", CatalogContext::in_memory)
        .unwrap();
    services.build()
}

#[test]
fn every_registered_key_resolves() {
    let registry = Arc::new(ContextRegistry::new());
    let scope = provider(&registry).create_scope();
    let factory = scope.factory();

    for key in registry.keys() {
        assert!(factory.has_context(&key));
        let uow = factory.get_unit_of_work(&key).unwrap();
        assert!(!uow.is_disposed());
    }
    assert_eq!(
        factory.get_unit_of_work("catalog").unwrap().context_name(),
        "CatalogContext"
    );
}

#[test]
fn duplicate_key_names_the_existing_context() {
    let registry = Arc::new(ContextRegistry::new());
    let mut services = ServiceCollection::new(Arc::clone(&registry));
    services
        .add_keyed_unit_of_work::<AccountContext, _>("account", AccountContext::in_memory)
        .unwrap();

    let err = services
        .add_keyed_unit_of_work::<CatalogContext, _>("account", CatalogContext::in_memory)
        .err()
        .unwrap();
    match &err {
        FactoryError::DuplicateKey { key, existing } => {
            assert_eq!(key, "account");
            assert_eq!(*existing, "AccountContext");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("AccountContext"));
    assert_eq!(
        registry.lookup("account").unwrap(),
        ContextType::of::<AccountContext>()
    );
}

#[test]
fn unknown_key_lists_available_contexts() {
    let registry = Arc::new(ContextRegistry::new());
    let scope = provider(&registry).create_scope();

    let err = scope.factory().get_unit_of_work("payment").err().unwrap();
    match &err {
        FactoryError::UnknownContext { key, available } => {
            assert_eq!(key, "payment");
            assert_eq!(available, &vec!["account".to_string(), "catalog".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("`account`, `catalog`"));
}

#[test]
fn blank_keys_are_invalid_or_absent() {
    let registry = Arc::new(ContextRegistry::new());
    let scope = provider(&registry).create_scope();
    let factory = scope.factory();

    assert!(!factory.has_context("   "));
    assert!(matches!(
        factory.get_unit_of_work(""),
        Err(FactoryError::InvalidArgument(_))
    ));
    assert!(matches!(
        factory.register(" ", ContextType::of::<AccountContext>()),
        Err(FactoryError::InvalidArgument(_))
    ));
}

#[test]
fn scope_caches_one_unit_of_work_per_context() {
    let registry = Arc::new(ContextRegistry::new());
    let scope = provider(&registry).create_scope();
    let factory = scope.factory();

    let by_key = factory.get_unit_of_work("account").unwrap();
    let by_type = factory.get_unit_of_work_for::<AccountContext>().unwrap();
    assert_eq!(by_key.id(), by_type.id());

    let by_key_repo = by_key.get_repository::<Customer>().unwrap();
    let by_type_repo = by_type.get_repository::<Customer>().unwrap();
    assert!(Rc::ptr_eq(&by_key_repo, &by_type_repo));

    let catalog = factory.get_unit_of_work("catalog").unwrap();
    assert_ne!(catalog.id(), by_key.id());
    catalog.get_repository::<Product>().unwrap();
    assert_eq!(scope.resolved_count(), 2);
}

#[test]
fn open_failures_surface_as_persistence_errors() {
    let registry = Arc::new(ContextRegistry::new());
    let mut services = ServiceCollection::new(Arc::clone(&registry));
    services
        .add_keyed_unit_of_work::<AccountContext, _>("account", || {
            Err(StoreError::InvalidConfig("no database configured".to_string()))
        })
        .unwrap();
    let scope = services.build().create_scope();

    let err = scope.factory().get_unit_of_work("account").err().unwrap();
    assert!(matches!(
        err,
        FactoryError::Persistence(StoreError::InvalidConfig(_))
    ));
    assert_eq!(scope.resolved_count(), 0);
}

#[test]
fn provider_is_shared_across_threads_with_independent_scopes() {
    let registry = Arc::new(ContextRegistry::new());
    let provider = provider(&registry);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provider = provider.clone();
            thread::spawn(move || {
                let scope = provider.create_scope();
                let uow = scope.factory().get_unit_of_work("account").unwrap();
                uow.get_repository::<Customer>()
                    .unwrap()
                    .insert(&Customer::new("c1", "Per scope", None))
                    .unwrap();
                uow.commit().unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
}

#[test]
fn global_registry_is_shared() {
    let key = format!("global-{}", uuid::Uuid::new_v4());
    ContextRegistry::global()
        .register_context::<AccountContext>(&key)
        .unwrap();

    assert!(ContextRegistry::global().contains(&key));
    assert!(ContextRegistry::global().snapshot().contains_key(&key));
}
