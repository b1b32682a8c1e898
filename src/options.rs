//! Iterator control packets and window arithmetic
//!
//! [`IteratorOptions`] is the control packet threaded through every iterator
//! constructor: projection, windowing, grouping, ordering, paging and time
//! bounds. It is immutable once construction completes; layers that need a
//! variation clone it.

use crate::ast::{BinaryOp, Expr, Fill, Measurement, VarRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Half-open time range `[min, max)` in Unix nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound
    pub min: i64,
    /// Exclusive upper bound
    pub max: i64,
}

impl TimeRange {
    /// The unbounded range
    pub fn unbounded() -> Self {
        Self {
            min: i64::MIN,
            max: i64::MAX,
        }
    }

    /// Range covering `[min, max)`
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// True when neither bound was constrained
    pub fn is_unbounded(&self) -> bool {
        self.min == i64::MIN && self.max == i64::MAX
    }

    /// True when both bounds are finite
    pub fn is_bounded(&self) -> bool {
        self.min != i64::MIN && self.max != i64::MAX
    }

    /// Intersection of two ranges
    pub fn intersect(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Window interval: width and alignment offset, both in nanoseconds.
/// A zero `every` disables windowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Window width
    pub every: i64,
    /// Window alignment offset
    pub offset: i64,
}

impl Interval {
    /// True when windowing is disabled
    pub fn is_zero(&self) -> bool {
        self.every == 0
    }
}

/// The control packet passed to every iterator constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IteratorOptions {
    /// The call or field being materialized, if any
    pub expr: Option<Expr>,
    /// Additional field references carried in each point's aux cells
    pub aux: Vec<VarRef>,
    /// Measurement sources
    pub sources: Vec<Measurement>,
    /// Time windowing
    pub interval: Interval,
    /// Ordered tag keys defining series groupings
    pub dimensions: Vec<String>,
    /// Tag keys fully retained in output tags
    pub group_by: BTreeSet<String>,
    /// Gap filling policy
    pub fill: Fill,
    /// Residual predicate, delegated to shards
    pub condition: Option<Expr>,
    /// Inclusive start of the queried range
    pub start_time: i64,
    /// Exclusive end of the queried range
    pub end_time: i64,
    /// Per-series row limit (0 = unlimited)
    pub limit: usize,
    /// Per-series row offset
    pub offset: usize,
    /// Series limit (0 = unlimited)
    pub slimit: usize,
    /// Series offset
    pub soffset: usize,
    /// Time ordering
    pub ascending: bool,
    /// Drop duplicate rows
    pub dedupe: bool,
}

impl IteratorOptions {
    /// Options with no projection over the unbounded range
    pub fn new() -> Self {
        Self {
            fill: Fill::None,
            start_time: i64::MIN,
            end_time: i64::MAX,
            ascending: true,
            ..Default::default()
        }
    }

    /// The window bucket containing `t` as `(start, end)`.
    ///
    /// With windowing disabled the whole time axis is one bucket.
    pub fn window(&self, t: i64) -> (i64, i64) {
        if self.interval.is_zero() {
            return (i64::MIN, i64::MAX);
        }
        let every = self.interval.every;
        let mut dt = (t - self.interval.offset) % every;
        if dt < 0 {
            dt += every;
        }
        let start = t - dt;
        (start, start.saturating_add(every))
    }

    /// Start of the window containing `t`, or 0 with windowing disabled.
    ///
    /// This is the time aggregate points are stamped with.
    pub fn window_start(&self, t: i64) -> i64 {
        if self.interval.is_zero() {
            return 0;
        }
        self.window(t).0
    }

    /// The tag keys reductions group by: the `group_by` set when present
    /// (selectors widen it for tag carry-over), the declared dimensions
    /// otherwise. Merge ordering always uses `dimensions`.
    pub fn effective_dimensions(&self) -> Vec<String> {
        if !self.group_by.is_empty() {
            self.group_by.iter().cloned().collect()
        } else {
            self.dimensions.clone()
        }
    }

    /// Whether merged upstreams need exact point ordering (raw streams) as
    /// opposed to window-run ordering (call streams).
    pub fn merge_sorted(&self) -> bool {
        !matches!(
            self.expr.as_ref().map(|e| e.unparenthesize()),
            Some(Expr::Call { .. })
        )
    }

    /// The queried time range
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Caller-level options passed to [`crate::select::select`] and forwarded
/// to the shard mapper. Reserved for caller policy hooks; the engine itself
/// reads nothing from it today.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SelectOptions {}

/// Split a condition into its time bounds and the residual predicate.
///
/// `time >= A AND time < B` yields `[A, B)`; `time = T` yields `[T, T+1)`.
/// Conjunctions are walked recursively, everything that is not a time bound
/// is re-joined with `AND` and returned as the residual.
pub fn split_time_condition(condition: Option<&Expr>) -> (TimeRange, Option<Expr>) {
    match condition {
        None => (TimeRange::unbounded(), None),
        Some(expr) => {
            let mut range = TimeRange::unbounded();
            let residual = walk_condition(expr.unparenthesize(), &mut range);
            (range, residual)
        }
    }
}

fn walk_condition(expr: &Expr, range: &mut TimeRange) -> Option<Expr> {
    if let Expr::Binary { op, lhs, rhs } = expr {
        if *op == BinaryOp::And {
            let left = walk_condition(lhs.unparenthesize(), range);
            let right = walk_condition(rhs.unparenthesize(), range);
            return match (left, right) {
                (Some(l), Some(r)) => Some(Expr::binary(BinaryOp::And, l, r)),
                (Some(l), None) => Some(l),
                (None, Some(r)) => Some(r),
                (None, None) => None,
            };
        }
        if let Some(bound) = time_bound(*op, lhs, rhs) {
            *range = range.intersect(&bound);
            return None;
        }
    }
    Some(expr.clone())
}

/// Interpret one comparison as a time bound, normalizing `A < time` forms.
fn time_bound(op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Option<TimeRange> {
    let (op, literal) = match (lhs.unparenthesize(), rhs.unparenthesize()) {
        (Expr::VarRef(v), Expr::Literal(l)) if v.name == "time" => (op, l),
        (Expr::Literal(l), Expr::VarRef(v)) if v.name == "time" => (flip(op)?, l),
        _ => return None,
    };
    let t = literal.as_nanos()?;
    match op {
        BinaryOp::GtEq => Some(TimeRange::new(t, i64::MAX)),
        BinaryOp::Gt => Some(TimeRange::new(t.saturating_add(1), i64::MAX)),
        BinaryOp::Lt => Some(TimeRange::new(i64::MIN, t)),
        BinaryOp::LtEq => Some(TimeRange::new(i64::MIN, t.saturating_add(1))),
        BinaryOp::Eq => Some(TimeRange::new(t, t.saturating_add(1))),
        _ => None,
    }
}

fn flip(op: BinaryOp) -> Option<BinaryOp> {
    match op {
        BinaryOp::Lt => Some(BinaryOp::Gt),
        BinaryOp::LtEq => Some(BinaryOp::GtEq),
        BinaryOp::Gt => Some(BinaryOp::Lt),
        BinaryOp::GtEq => Some(BinaryOp::LtEq),
        BinaryOp::Eq => Some(BinaryOp::Eq),
        _ => None,
    }
}
