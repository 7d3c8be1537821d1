use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::convert::Infallible;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Anything that can report its size and hand out a window of items.
///
/// Implemented for in-memory slices and vectors, and for store queries so
/// the window is pushed down as `LIMIT/OFFSET`.
pub trait PageSource {
    type Item;
    type Error;

    fn count(&self) -> Result<usize, Self::Error>;

    /// Returns up to `limit` items starting at `offset`; `None` means no
    /// upper bound.
    fn fetch(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Self::Item>, Self::Error>;
}

impl<T: Clone> PageSource for [T] {
    type Item = T;
    type Error = Infallible;

    fn count(&self) -> Result<usize, Infallible> {
        Ok(self.len())
    }

    fn fetch(&self, offset: usize, limit: Option<usize>) -> Result<Vec<T>, Infallible> {
        let remaining = self.iter().skip(offset);
        Ok(match limit {
            Some(limit) => remaining.take(limit).cloned().collect(),
            None => remaining.cloned().collect(),
        })
    }
}

impl<T: Clone> PageSource for Vec<T> {
    type Item = T;
    type Error = Infallible;

    fn count(&self) -> Result<usize, Infallible> {
        self.as_slice().count()
    }

    fn fetch(&self, offset: usize, limit: Option<usize>) -> Result<Vec<T>, Infallible> {
        self.as_slice().fetch(offset, limit)
    }
}

/// Requested page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: usize,
    /// Items per page; 0 returns every item.
    pub size: usize,
    /// Page-numbering origin.
    pub from: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            index: 0,
            size: DEFAULT_PAGE_SIZE,
            from: 0,
        }
    }
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self {
            index,
            size,
            from: 0,
        }
    }

    pub fn unpaged() -> Self {
        Self::new(0, 0)
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    /// `(offset, limit)` of the requested window, `None` when unpaged.
    fn window(&self) -> Option<(usize, usize)> {
        if self.size == 0 {
            return None;
        }
        let offset = (self.index - self.from).saturating_mul(self.size);
        Some((offset, self.size))
    }

    fn check<E>(&self) -> Result<(), PageError<E>> {
        if self.from > self.index {
            return Err(PageError::InvalidArgument {
                from: self.from,
                index: self.index,
            });
        }
        Ok(())
    }
}

/// Pagination failure; `E` is the source's own error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError<E = Infallible> {
    /// `from > index`.
    InvalidArgument { from: usize, index: usize },
    Source(E),
}

impl<E: Display> Display for PageError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { from, index } => write!(
                f,
                "page origin {from} is greater than page index {index}; from must be <= index"
            ),
            Self::Source(err) => write!(f, "{err}"),
        }
    }
}

impl<E: Error + 'static> Error for PageError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidArgument { .. } => None,
            Self::Source(err) => Some(err),
        }
    }
}

/// Immutable page descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    from: usize,
    index: usize,
    size: usize,
    filtered: usize,
    count: usize,
    pages: usize,
    items: Vec<T>,
}

impl<T> Page<T> {
    /// Zero-item, zero-count page for short-circuit results.
    pub fn empty() -> Self {
        Self {
            from: 0,
            index: 0,
            size: 0,
            filtered: 0,
            count: 0,
            pages: 0,
            items: Vec::new(),
        }
    }

    fn assemble(request: PageRequest, filtered: usize, count: usize, items: Vec<T>) -> Self {
        let pages = if request.size == 0 {
            1
        } else {
            count.div_ceil(request.size)
        };
        Self {
            from: request.from,
            index: request.index,
            size: request.size,
            filtered,
            count,
            pages,
            items,
        }
    }

    pub fn from(&self) -> usize {
        self.from
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Item count of the source after upstream filtering.
    pub fn filtered(&self) -> usize {
        self.filtered
    }

    /// Unfiltered population size supplied by the caller.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn has_previous(&self) -> bool {
        self.index - self.from > 0
    }

    pub fn has_next(&self) -> bool {
        self.index - self.from + 1 < self.pages
    }

    /// Re-derives the items with `converter`, keeping every counter.
    pub fn convert<R>(self, converter: impl FnOnce(Vec<T>) -> Vec<R>) -> Page<R> {
        Page {
            from: self.from,
            index: self.index,
            size: self.size,
            filtered: self.filtered,
            count: self.count,
            pages: self.pages,
            items: converter(self.items),
        }
    }

    /// Per-item shorthand for [`Page::convert`].
    pub fn map<R>(self, f: impl FnMut(T) -> R) -> Page<R> {
        self.convert(|items| items.into_iter().map(f).collect())
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Page", 9)?;
        state.serialize_field("from", &self.from)?;
        state.serialize_field("index", &self.index)?;
        state.serialize_field("size", &self.size)?;
        state.serialize_field("filtered", &self.filtered)?;
        state.serialize_field("count", &self.count)?;
        state.serialize_field("pages", &self.pages)?;
        state.serialize_field("items", &self.items)?;
        state.serialize_field("hasPrevious", &self.has_previous())?;
        state.serialize_field("hasNext", &self.has_next())?;
        state.end()
    }
}

/// Builds one page out of `source`.
///
/// `total_count` is the unfiltered population size and is taken as given.
///
/// # Errors
/// - `InvalidArgument` when `request.from > request.index`.
/// - `Source` when counting or fetching fails.
pub fn paginate<S>(
    source: &S,
    request: PageRequest,
    total_count: usize,
) -> Result<Page<S::Item>, PageError<S::Error>>
where
    S: PageSource + ?Sized,
{
    request.check()?;

    let filtered = source.count().map_err(PageError::Source)?;
    let items = match request.window() {
        Some((offset, limit)) => source.fetch(offset, Some(limit)),
        None => source.fetch(0, None),
    }
    .map_err(PageError::Source)?;

    Ok(Page::assemble(request, filtered, total_count, items))
}

/// [`paginate`] followed by a whole-window conversion of the items.
pub fn paginate_with<S, R>(
    source: &S,
    converter: impl FnOnce(Vec<S::Item>) -> Vec<R>,
    request: PageRequest,
    total_count: usize,
) -> Result<Page<R>, PageError<S::Error>>
where
    S: PageSource + ?Sized,
{
    paginate(source, request, total_count).map(|page| page.convert(converter))
}
