use crate::store::{Entity, Filter, Query};

/// Query-reshaping step supplied by the caller (ordering or includes).
pub type QueryShaper<T> = Box<dyn for<'s> Fn(Query<'s, T>) -> Query<'s, T>>;

/// Read criteria shared by `find`, `get` and `get_as`.
///
/// Every part is optional; the default reads everything with tracking.
pub struct Criteria<T: Entity> {
    predicate: Option<Filter>,
    order_by: Option<QueryShaper<T>>,
    include: Option<QueryShaper<T>>,
    tracking: bool,
}

impl<T: Entity> Default for Criteria<T> {
    fn default() -> Self {
        Self {
            predicate: None,
            order_by: None,
            include: None,
            tracking: true,
        }
    }
}

impl<T: Entity> Criteria<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matching(predicate: Filter) -> Self {
        Self::new().filter(predicate)
    }

    /// Sets the predicate, AND-ing with any predicate already present.
    pub fn filter(mut self, predicate: Filter) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn order_by<F>(mut self, shaper: F) -> Self
    where
        F: for<'s> Fn(Query<'s, T>) -> Query<'s, T> + 'static,
    {
        self.order_by = Some(Box::new(shaper));
        self
    }

    pub fn include<F>(mut self, shaper: F) -> Self
    where
        F: for<'s> Fn(Query<'s, T>) -> Query<'s, T> + 'static,
    {
        self.include = Some(Box::new(shaper));
        self
    }

    pub fn no_tracking(self) -> Self {
        self.tracking(false)
    }

    pub fn tracking(mut self, enabled: bool) -> Self {
        self.tracking = enabled;
        self
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn predicate(&self) -> Option<&Filter> {
        self.predicate.as_ref()
    }

    /// Applies include, then predicate, then ordering.
    pub(crate) fn apply<'s>(&self, mut query: Query<'s, T>) -> Query<'s, T> {
        if !self.tracking {
            query = query.as_no_tracking();
        }
        if let Some(include) = &self.include {
            query = include(query);
        }
        if let Some(predicate) = &self.predicate {
            query = query.filter(predicate.clone());
        }
        if let Some(order_by) = &self.order_by {
            query = order_by(query);
        }
        query
    }
}
