//! Store-agnostic pagination.
//!
//! # Responsibility
//! - Turn any countable, windowable source into a bounded page descriptor.
//! - Reshape existing pages without re-querying their source.
//!
//! # Invariants
//! - `from <= index` for every constructed page.
//! - `pages == ceil(count / size)` when `size > 0`; `size == 0` is unpaged
//!   and reports a single page.
//! - `filtered` is counted from the source as received; this module never
//!   filters.

mod data_table;
mod page;

pub use data_table::DataTableResponse;
pub use page::{
    paginate, paginate_with, Page, PageError, PageRequest, PageSource, DEFAULT_PAGE_SIZE,
};
