//! Composable query pipeline over one entity table.
//!
//! # Responsibility
//! - Collect filters, joins, ordering and windowing, then render one
//!   parameterised SQL statement at materialisation time.
//! - Push pagination windows down to `LIMIT/OFFSET`.
//!
//! # Invariants
//! - User values are always bound as parameters, never spliced into SQL.
//! - Tracked reads attach every materialised key to the change tracker.
//! - Joins never duplicate root rows; joined reads select and count
//!   `DISTINCT` root entities.

use super::engine::{Entity, Store};
use super::{StoreError, StoreResult};
use crate::paging::PageSource;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::fmt::{Debug, Formatter};
use std::ops::Not;
use std::rc::Rc;

static IDENTIFIER_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid identifier regex")
});

/// SQL predicate with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    sql: String,
    params: Vec<Value>,
}

impl Filter {
    /// Predicate from a raw SQL fragment using `?` placeholders.
    pub fn raw(sql: impl Into<String>, params: impl IntoIterator<Item = Value>) -> Self {
        Self {
            sql: sql.into(),
            params: params.into_iter().collect(),
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, "=", value.into())
    }

    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, "<>", value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, "<", value.into())
    }

    pub fn le(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, "<=", value.into())
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, ">", value.into())
    }

    pub fn ge(column: &str, value: impl Into<Value>) -> Self {
        Self::compare(column, ">=", value.into())
    }

    pub fn like(column: &str, pattern: impl Into<String>) -> Self {
        Self::compare(column, "LIKE", Value::Text(pattern.into()))
    }

    pub fn is_null(column: &str) -> Self {
        Self::raw(format!("{column} IS NULL"), [])
    }

    pub fn is_not_null(column: &str) -> Self {
        Self::raw(format!("{column} IS NOT NULL"), [])
    }

    pub fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let params: Vec<Value> = values.into_iter().map(Into::into).collect();
        if params.is_empty() {
            return Self::raw("0", []);
        }
        let placeholders = vec!["?"; params.len()].join(", ");
        Self::raw(format!("{column} IN ({placeholders})"), params)
    }

    pub fn and(self, other: Filter) -> Self {
        self.combine("AND", other)
    }

    pub fn or(self, other: Filter) -> Self {
        self.combine("OR", other)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn compare(column: &str, operator: &str, value: Value) -> Self {
        Self::raw(format!("{column} {operator} ?"), [value])
    }

    fn combine(mut self, operator: &str, other: Filter) -> Self {
        self.sql = format!("({}) {operator} ({})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(mut self) -> Filter {
        self.sql = format!("NOT ({})", self.sql);
        self
    }
}

type Loader<T> = Rc<dyn Fn(&Connection, &mut T) -> rusqlite::Result<()>>;

/// Eager-load directive.
///
/// A join makes related tables visible to filters and ordering; a loader
/// fills related data on each materialised entity over the same
/// connection. Either or both may be set.
pub struct Include<T> {
    join: Option<String>,
    loader: Option<Loader<T>>,
}

impl<T> Include<T> {
    /// `clause` is a full join, e.g. `LEFT JOIN accounts ON accounts.id = orders.account_id`.
    pub fn join(clause: impl Into<String>) -> Self {
        Self {
            join: Some(clause.into()),
            loader: None,
        }
    }

    pub fn load(loader: impl Fn(&Connection, &mut T) -> rusqlite::Result<()> + 'static) -> Self {
        Self {
            join: None,
            loader: Some(Rc::new(loader)),
        }
    }

    pub fn with_loader(
        mut self,
        loader: impl Fn(&Connection, &mut T) -> rusqlite::Result<()> + 'static,
    ) -> Self {
        self.loader = Some(Rc::new(loader));
        self
    }
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        Self {
            join: self.join.clone(),
            loader: self.loader.clone(),
        }
    }
}

impl<T> Debug for Include<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Include")
            .field("join", &self.join)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderTerm {
    column: String,
    descending: bool,
}

/// Lazily-evaluated query; nothing runs until `count`, `first`,
/// `to_list` or a page fetch.
pub struct Query<'s, T: Entity> {
    store: &'s Store,
    filters: Vec<Filter>,
    ordering: Vec<OrderTerm>,
    includes: Vec<Include<T>>,
    tracking: bool,
    skip: usize,
    take: Option<usize>,
}

impl<T: Entity> Clone for Query<'_, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            filters: self.filters.clone(),
            ordering: self.ordering.clone(),
            includes: self.includes.clone(),
            tracking: self.tracking,
            skip: self.skip,
            take: self.take,
        }
    }
}

impl<'s, T: Entity> Query<'s, T> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self {
            store,
            filters: Vec::new(),
            ordering: Vec::new(),
            includes: Vec::new(),
            tracking: true,
            skip: 0,
            take: None,
        }
    }

    /// Adds a predicate; multiple predicates are AND-ed.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replaces any ordering with `column ASC`.
    pub fn order_by(self, column: &str) -> Self {
        self.reorder(column, false)
    }

    /// Replaces any ordering with `column DESC`.
    pub fn order_by_desc(self, column: &str) -> Self {
        self.reorder(column, true)
    }

    /// Appends a secondary `column ASC` key.
    pub fn then_by(self, column: &str) -> Self {
        self.push_order(column, false)
    }

    pub fn then_by_desc(self, column: &str) -> Self {
        self.push_order(column, true)
    }

    /// Orders by a column named at runtime, e.g. from a grid request.
    ///
    /// `name` may be `column` or `table.column`. Unqualified names and
    /// names qualified with this entity's table must be one of
    /// `T::COLUMNS`. With `then_by` the key is appended instead of
    /// replacing the current ordering.
    pub fn order_by_property(self, name: &str, descending: bool, then_by: bool) -> StoreResult<Self> {
        let name = name.trim();
        if !IDENTIFIER_PATH_RE.is_match(name) {
            return Err(StoreError::InvalidIdentifier(name.to_string()));
        }

        let column = match name.split_once('.') {
            Some((table, column)) if table == T::TABLE => Some(column),
            Some(_) => None,
            None => Some(name),
        };
        if let Some(column) = column {
            if !T::COLUMNS.contains(&column) {
                return Err(StoreError::UnknownColumn {
                    table: T::TABLE,
                    column: column.to_string(),
                });
            }
        }

        Ok(if then_by {
            self.push_order(name, descending)
        } else {
            self.reorder(name, descending)
        })
    }

    pub fn include(mut self, include: Include<T>) -> Self {
        self.includes.push(include);
        self
    }

    /// Reads without attaching results to the change tracker.
    pub fn as_no_tracking(mut self) -> Self {
        self.tracking = false;
        self
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = self.skip.saturating_add(count);
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(self.take.map_or(count, |current| current.min(count)));
        self
    }

    /// Number of rows the query yields, honouring `skip`/`take`.
    pub fn count(&self) -> StoreResult<usize> {
        let (from_sql, params) = self.from_clause();
        let conn = self.store.connection()?;
        let counted = if self.has_joins() {
            format!("DISTINCT {}.{}", T::TABLE, T::KEY)
        } else {
            "*".to_string()
        };
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT({counted}) {from_sql};"),
            params_from_iter(params),
            |row| row.get(0),
        )?;

        let after_skip = usize::try_from(total)
            .unwrap_or_default()
            .saturating_sub(self.skip);
        Ok(self.take.map_or(after_skip, |take| after_skip.min(take)))
    }

    pub fn first(&self) -> StoreResult<Option<T>> {
        Ok(self.fetch_window(0, Some(1))?.into_iter().next())
    }

    pub fn to_list(&self) -> StoreResult<Vec<T>> {
        self.fetch_window(0, None)
    }

    /// Projects each materialised entity through `selector`.
    pub fn select<R, F>(self, selector: F) -> Projection<'s, T, F>
    where
        F: Fn(T) -> R,
    {
        Projection {
            query: self,
            selector,
        }
    }

    fn reorder(mut self, column: &str, descending: bool) -> Self {
        self.ordering.clear();
        self.push_order(column, descending)
    }

    fn push_order(mut self, column: &str, descending: bool) -> Self {
        self.ordering.push(OrderTerm {
            column: column.to_string(),
            descending,
        });
        self
    }

    fn has_joins(&self) -> bool {
        self.includes.iter().any(|include| include.join.is_some())
    }

    fn from_clause(&self) -> (String, Vec<Value>) {
        let mut sql = format!("FROM {}", T::TABLE);
        for join in self.includes.iter().filter_map(|include| include.join.as_deref()) {
            sql.push(' ');
            sql.push_str(join);
        }

        let mut params = Vec::new();
        if !self.filters.is_empty() {
            let clauses: Vec<String> = self
                .filters
                .iter()
                .map(|filter| format!("({})", filter.sql))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
            for filter in &self.filters {
                params.extend(filter.params.iter().cloned());
            }
        }

        (sql, params)
    }

    fn fetch_window(&self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<T>> {
        let start = self.skip.saturating_add(offset);
        let limit = match (self.take, limit) {
            (None, limit) => limit,
            (Some(take), None) => Some(take.saturating_sub(offset)),
            (Some(take), Some(limit)) => Some(limit.min(take.saturating_sub(offset))),
        };

        let columns: Vec<String> = T::COLUMNS
            .iter()
            .map(|column| format!("{}.{column}", T::TABLE))
            .collect();
        let (from_sql, mut params) = self.from_clause();
        let distinct = if self.has_joins() { "DISTINCT " } else { "" };
        let mut sql = format!("SELECT {distinct}{} {from_sql}", columns.join(", "));

        if !self.ordering.is_empty() {
            let terms: Vec<String> = self
                .ordering
                .iter()
                .map(|term| {
                    if term.descending {
                        format!("{} DESC", term.column)
                    } else {
                        format!("{} ASC", term.column)
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match limit {
            Some(limit) => {
                sql.push_str(" LIMIT ?");
                params.push(Value::Integer(to_sql_int(limit)));
                if start > 0 {
                    sql.push_str(" OFFSET ?");
                    params.push(Value::Integer(to_sql_int(start)));
                }
            }
            None if start > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Value::Integer(to_sql_int(start)));
            }
            None => {}
        }

        let conn = self.store.connection()?;
        let mut items = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), T::from_row)?;
            rows.collect::<rusqlite::Result<Vec<T>>>()?
        };

        for loader in self.includes.iter().filter_map(|include| include.loader.as_ref()) {
            for item in &mut items {
                loader(&*conn, item)?;
            }
        }
        drop(conn);

        if self.tracking {
            self.store.attach_all(&items);
        }
        Ok(items)
    }
}

impl<T: Entity> PageSource for Query<'_, T> {
    type Item = T;
    type Error = StoreError;

    fn count(&self) -> StoreResult<usize> {
        Query::count(self)
    }

    fn fetch(&self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<T>> {
        self.fetch_window(offset, limit)
    }
}

/// Query whose rows are reshaped by a selector before they are returned.
pub struct Projection<'s, T: Entity, F> {
    query: Query<'s, T>,
    selector: F,
}

impl<T, R, F> Projection<'_, T, F>
where
    T: Entity,
    F: Fn(T) -> R,
{
    pub fn to_list(&self) -> StoreResult<Vec<R>> {
        PageSource::fetch(self, 0, None)
    }

    pub fn first(&self) -> StoreResult<Option<R>> {
        Ok(PageSource::fetch(self, 0, Some(1))?.into_iter().next())
    }
}

impl<T, R, F> PageSource for Projection<'_, T, F>
where
    T: Entity,
    F: Fn(T) -> R,
{
    type Item = R;
    type Error = StoreError;

    fn count(&self) -> StoreResult<usize> {
        self.query.count()
    }

    fn fetch(&self, offset: usize, limit: Option<usize>) -> StoreResult<Vec<R>> {
        let rows = self.query.fetch_window(offset, limit)?;
        Ok(rows.into_iter().map(&self.selector).collect())
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
