//! Property search: the filter state a listing page holds in its URL, and the
//! translation of that state into backend predicates, ordering, and paging.

pub mod filter;
pub mod page;
pub mod predicate;
pub mod sort;

pub use filter::{FilterError, FilterState, PropertyFilter};
pub use page::PageSpec;
pub use predicate::{Field, Predicate, Query, translate};
pub use sort::{Direction, SortField, SortSpec};
