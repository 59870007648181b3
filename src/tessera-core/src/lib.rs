//! Core data model for Tessera.
//!
//! This crate provides the leaf types every other layer builds on:
//! - [`Symbol`]: interned names that compare and hash by identity
//! - [`Value`]: runtime values, with column views backed by Arrow arrays
//! - [`Slice`]: the rows of one group
//! - [`ColumnSubsets`]: resolves a column name and a slice to a view
//! - [`Collector`]: the type-promoting sink per-group results are gathered into

pub mod collect;
pub mod slice;
pub mod subsets;
pub mod symbol;
pub mod value;

pub use collect::{Collector, TypedCollector, ValueKind, collect_into, collector_for, combine_all};
pub use slice::{Slice, SliceIter};
pub use subsets::{ColumnSubsets, TableSubsets};
pub use symbol::Symbol;
pub use value::Value;
