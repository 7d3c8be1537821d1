use super::{Criteria, RepoError, RepoResult};
use crate::paging::{paginate, Page, PageRequest};
use crate::store::{DbContext, Entity, Filter, Store};
use log::debug;
use std::marker::PhantomData;
use std::rc::Weak;

/// Read/write facade for one entity type, bound to one context.
///
/// Obtained from a unit of work, which caches one instance per entity
/// type.
pub struct Repository<T: Entity> {
    context: Weak<dyn DbContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(context: Weak<dyn DbContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// First entity matching `criteria`, or `None`.
    pub fn find(&self, criteria: &Criteria<T>) -> RepoResult<Option<T>> {
        self.with_store(|store| Ok(criteria.apply(store.query::<T>()).first()?))
    }

    pub fn find_where(&self, predicate: Filter) -> RepoResult<Option<T>> {
        self.find(&Criteria::matching(predicate))
    }

    /// One page of entities matching `criteria`.
    ///
    /// `count` on the page is the unfiltered row count of `T`'s table.
    pub fn get(&self, criteria: &Criteria<T>, request: PageRequest) -> RepoResult<Page<T>> {
        self.with_store(|store| {
            let query = criteria.apply(store.query::<T>());
            let page = paginate(&query, request, store.count::<T>()?)?;
            log_page::<T>(&page);
            Ok(page)
        })
    }

    pub fn get_all(&self, request: PageRequest) -> RepoResult<Page<T>> {
        self.get(&Criteria::new(), request)
    }

    /// Like [`Repository::get`], projecting each row through `selector`
    /// before the page is assembled.
    pub fn get_as<R, F>(
        &self,
        selector: F,
        criteria: &Criteria<T>,
        request: PageRequest,
    ) -> RepoResult<Page<R>>
    where
        F: Fn(T) -> R,
    {
        self.with_store(|store| {
            let projection = criteria.apply(store.query::<T>()).select(selector);
            let page = paginate(&projection, request, store.count::<T>()?)?;
            log_page::<T>(&page);
            Ok(page)
        })
    }

    /// Stages an insert and hands the entity back.
    pub fn insert<'e>(&self, entity: &'e T) -> RepoResult<&'e T> {
        self.with_store(|store| Ok(store.add(entity)?))?;
        Ok(entity)
    }

    pub fn update<'e>(&self, entity: &'e T) -> RepoResult<&'e T> {
        self.with_store(|store| Ok(store.update(entity)?))?;
        Ok(entity)
    }

    pub fn remove<'e>(&self, entity: &'e T) -> RepoResult<&'e T> {
        self.with_store(|store| Ok(store.remove(entity)?))?;
        Ok(entity)
    }

    /// Stages inserts for every entity; returns how many were staged.
    pub fn insert_range<'e, I>(&self, entities: I) -> RepoResult<usize>
    where
        I: IntoIterator<Item = &'e T>,
    {
        self.with_store(|store| Ok(store.add_range(entities)?))
    }

    pub fn update_range<'e, I>(&self, entities: I) -> RepoResult<usize>
    where
        I: IntoIterator<Item = &'e T>,
    {
        self.with_store(|store| Ok(store.update_range(entities)?))
    }

    pub fn remove_range<'e, I>(&self, entities: I) -> RepoResult<usize>
    where
        I: IntoIterator<Item = &'e T>,
    {
        self.with_store(|store| Ok(store.remove_range(entities)?))
    }

    /// Whether the owning context is still alive.
    pub fn is_attached(&self) -> bool {
        self.context.strong_count() > 0
    }

    fn with_store<R>(&self, f: impl FnOnce(&Store) -> RepoResult<R>) -> RepoResult<R> {
        let context = self.context.upgrade().ok_or(RepoError::Disposed)?;
        f(context.store())
    }
}

fn log_page<T: Entity>(page: &Page<impl Sized>) {
    debug!(
        "event=repo_get module=repo status=ok table={} index={} size={} filtered={} count={}",
        T::TABLE,
        page.index(),
        page.size(),
        page.filtered(),
        page.count()
    );
}
