//! Consumed collaborator interfaces: the shard mapper and shard groups
//!
//! The engine never touches storage. A [`ShardMapper`] turns the statement's
//! sources and time range into a [`ShardGroup`]; the group creates one raw
//! iterator per measurement under a set of iterator options and answers
//! schema questions about fields and dimensions.

use crate::error::Result;
use crate::iterator::AnyIterator;
use crate::options::{IteratorOptions, SelectOptions, TimeRange};
use crate::point::DataType;
use std::collections::{HashMap, HashSet};

/// Opaque cost hints for a prospective iterator. The planner logs them;
/// nothing is optimized against them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorCost {
    /// Distinct series the iterator would touch
    pub num_series: u64,
    /// Points the iterator would read
    pub point_count: u64,
    /// Aux fields decoded per point
    pub aux_fields: u64,
}

impl IteratorCost {
    /// Combine the cost of two iterators read together
    pub fn combine(&self, other: &IteratorCost) -> IteratorCost {
        IteratorCost {
            num_series: self.num_series + other.num_series,
            point_count: self.point_count + other.point_count,
            aux_fields: self.aux_fields + other.aux_fields,
        }
    }
}

/// The bundle of shards covering a query's sources and time range.
pub trait ShardGroup: Send {
    /// Create a raw iterator for the measurement under the given options.
    ///
    /// When `options.expr` is an aggregate call the group is expected to
    /// have already applied [`crate::operators::call::new_call_iterator`]
    /// per shard, so the stream carries per-shard partials.
    fn create_iterator(
        &mut self,
        measurement: &str,
        options: &IteratorOptions,
    ) -> Result<AnyIterator>;

    /// Cost hints for a prospective iterator; optional.
    fn iterator_cost(
        &self,
        _measurement: &str,
        _options: &IteratorOptions,
    ) -> Result<IteratorCost> {
        Ok(IteratorCost::default())
    }

    /// The fields (with types) and tag dimensions of a measurement.
    fn field_dimensions(
        &self,
        measurement: &str,
    ) -> Result<(HashMap<String, DataType>, HashSet<String>)>;

    /// Resolve a name to its type: a field's data type, `Tag` for
    /// dimension names, `Unknown` otherwise.
    fn map_type(&self, measurement: &str, field: &str) -> DataType;

    /// Release the group's resources. Idempotent.
    fn close(&mut self) {}
}

/// Maps statement sources and a time range to a shard group.
pub trait ShardMapper {
    /// Produce the group covering `sources` over `range`.
    fn map_shards(
        &self,
        sources: &[crate::ast::Measurement],
        range: &TimeRange,
        options: &SelectOptions,
    ) -> Result<Box<dyn ShardGroup>>;
}
