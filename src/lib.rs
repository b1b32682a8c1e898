//! Gorilla Query - query execution engine for the Gorilla time-series database
//!
//! This library is the execution core behind `SELECT`: a composable pipeline
//! of typed point iterators wired together from a parsed statement. It
//! provides:
//! - A four-kind typed point model (float/integer/string/boolean) with tag
//!   sets and auxiliary field cells
//! - K-way merges preserving `(name, tags, time)` ordering across shards
//! - Windowed aggregation with two-stage partial combining
//! - Selector, transform, fill and binary-expression operators
//! - A planner turning a statement plus a shard mapper into one iterator
//!   per projection
//!
//! Parsing, storage and result serialization live in collaborators; this
//! crate consumes a [`ast::SelectStatement`] and a [`shard::ShardMapper`]
//! and produces lazy iterators.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod error;
pub mod holt_winters;
pub mod iterator;
pub mod operators;
pub mod options;
pub mod point;
pub mod select;
pub mod shard;

// Re-export main types
pub use ast::{Expr, Fill, Measurement, SelectStatement, VarRef};
pub use error::{QueryError, Result};
pub use iterator::{
    drain_iterators, AnyIterator, IteratorStats, Iterators, PointIterator, VecIterator,
};
pub use operators::call::new_call_iterator;
pub use options::{IteratorOptions, SelectOptions, TimeRange};
pub use point::{
    AnyPoint, BooleanPoint, CellValue, DataType, FloatPoint, IntegerPoint, Point, StringPoint,
    Tags,
};
pub use select::select;
pub use shard::{IteratorCost, ShardGroup, ShardMapper};
