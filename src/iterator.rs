//! The pull-based iterator protocol
//!
//! Every stage of a query pipeline implements [`PointIterator`] for one of
//! the four point types. [`AnyIterator`] is the type-erased form handed
//! across public seams (shards, the planner, merges); it carries exactly one
//! typed iterator and remembers which kind.
//!
//! Iterators are lazy and single-consumer. `close` is idempotent and
//! propagates to upstreams; after close, `next_point` returns end-of-stream.

use crate::error::{QueryError, Result};
use crate::options::IteratorOptions;
use crate::point::{AnyPoint, DataType, Point, PointValue, Tags};

/// Observability counters accumulated by an iterator.
///
/// Counters are owned by their iterator and are only guaranteed stable once
/// the iterator is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorStats {
    /// Number of distinct series observed
    pub series_n: usize,
    /// Number of points produced
    pub point_n: usize,
}

impl IteratorStats {
    /// Accumulate another stats block into this one
    pub fn add(&mut self, other: &IteratorStats) {
        self.series_n += other.series_n;
        self.point_n += other.point_n;
    }
}

/// A lazy, typed sequence of points.
pub trait PointIterator<V: PointValue>: Send {
    /// Pull the next point.
    ///
    /// Returns `Ok(None)` at end-of-stream; errors propagate from upstream
    /// shards and terminate the stream.
    fn next_point(&mut self) -> Result<Option<Point<V>>>;

    /// Observability counters
    fn stats(&self) -> IteratorStats {
        IteratorStats::default()
    }

    /// Release the iterator and its upstreams. Idempotent.
    fn close(&mut self) {}
}

impl<V: PointValue> std::fmt::Debug for dyn PointIterator<V> + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PointIterator>")
    }
}

impl<V: PointValue> PointIterator<V> for Box<dyn PointIterator<V>> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        (**self).next_point()
    }

    fn stats(&self) -> IteratorStats {
        (**self).stats()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Iterator over an in-memory point vector.
///
/// The building block for tests and for adapting already-materialized data
/// into a pipeline.
pub struct VecIterator<V: PointValue> {
    points: std::vec::IntoIter<Point<V>>,
    stats: IteratorStats,
    last_series: Option<(String, Tags)>,
    closed: bool,
}

impl<V: PointValue> VecIterator<V> {
    /// Iterator yielding the given points in order
    pub fn new(points: Vec<Point<V>>) -> Self {
        Self {
            points: points.into_iter(),
            stats: IteratorStats::default(),
            last_series: None,
            closed: false,
        }
    }
}

impl<V: PointValue> PointIterator<V> for VecIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if self.closed {
            return Ok(None);
        }
        match self.points.next() {
            Some(p) => {
                self.stats.point_n += 1;
                let series = (p.name.clone(), p.tags.clone());
                if self.last_series.as_ref() != Some(&series) {
                    self.stats.series_n += 1;
                    self.last_series = Some(series);
                }
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    fn stats(&self) -> IteratorStats {
        self.stats
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// An iterator that yields nothing
pub struct EmptyIterator;

impl<V: PointValue> PointIterator<V> for EmptyIterator {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        Ok(None)
    }
}

/// One-point lookahead adapter over a boxed iterator.
pub struct Buffered<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    head: Option<Point<V>>,
}

impl<V: PointValue> Buffered<V> {
    /// Wrap an iterator with peek support
    pub fn new(input: Box<dyn PointIterator<V>>) -> Self {
        Self { input, head: None }
    }

    /// Look at the next point without consuming it
    pub fn peek(&mut self) -> Result<Option<&Point<V>>> {
        if self.head.is_none() {
            self.head = self.input.next_point()?;
        }
        Ok(self.head.as_ref())
    }

    /// Push a point back; the next pull returns it
    pub fn unread(&mut self, point: Point<V>) {
        debug_assert!(self.head.is_none());
        self.head = Some(point);
    }
}

impl<V: PointValue> PointIterator<V> for Buffered<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if let Some(p) = self.head.take() {
            return Ok(Some(p));
        }
        self.input.next_point()
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        self.head = None;
        self.input.close();
    }
}

/// A typed iterator behind a single type-erased handle.
pub enum AnyIterator {
    /// Float stream
    Float(Box<dyn PointIterator<f64>>),
    /// Integer stream
    Integer(Box<dyn PointIterator<i64>>),
    /// String stream
    String(Box<dyn PointIterator<String>>),
    /// Boolean stream
    Boolean(Box<dyn PointIterator<bool>>),
}

impl std::fmt::Debug for AnyIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            AnyIterator::Float(_) => "Float",
            AnyIterator::Integer(_) => "Integer",
            AnyIterator::String(_) => "String",
            AnyIterator::Boolean(_) => "Boolean",
        };
        write!(f, "AnyIterator::{}", variant)
    }
}

impl AnyIterator {
    /// Wrap a float iterator
    pub fn float(it: impl PointIterator<f64> + 'static) -> Self {
        AnyIterator::Float(Box::new(it))
    }

    /// Wrap an integer iterator
    pub fn integer(it: impl PointIterator<i64> + 'static) -> Self {
        AnyIterator::Integer(Box::new(it))
    }

    /// Wrap a string iterator
    pub fn string(it: impl PointIterator<String> + 'static) -> Self {
        AnyIterator::String(Box::new(it))
    }

    /// Wrap a boolean iterator
    pub fn boolean(it: impl PointIterator<bool> + 'static) -> Self {
        AnyIterator::Boolean(Box::new(it))
    }

    /// An empty iterator of the given kind
    pub fn empty(kind: DataType) -> Self {
        match kind {
            DataType::Integer => AnyIterator::Integer(Box::new(EmptyIterator)),
            DataType::String => AnyIterator::String(Box::new(EmptyIterator)),
            DataType::Boolean => AnyIterator::Boolean(Box::new(EmptyIterator)),
            _ => AnyIterator::Float(Box::new(EmptyIterator)),
        }
    }

    /// The point kind this iterator yields
    pub fn data_type(&self) -> DataType {
        match self {
            AnyIterator::Float(_) => DataType::Float,
            AnyIterator::Integer(_) => DataType::Integer,
            AnyIterator::String(_) => DataType::String,
            AnyIterator::Boolean(_) => DataType::Boolean,
        }
    }

    /// Pull the next point in type-erased form
    pub fn next_any(&mut self) -> Result<Option<AnyPoint>> {
        Ok(match self {
            AnyIterator::Float(it) => it.next_point()?.map(AnyPoint::Float),
            AnyIterator::Integer(it) => it.next_point()?.map(AnyPoint::Integer),
            AnyIterator::String(it) => it.next_point()?.map(AnyPoint::String),
            AnyIterator::Boolean(it) => it.next_point()?.map(AnyPoint::Boolean),
        })
    }

    /// Observability counters
    pub fn stats(&self) -> IteratorStats {
        match self {
            AnyIterator::Float(it) => it.stats(),
            AnyIterator::Integer(it) => it.stats(),
            AnyIterator::String(it) => it.stats(),
            AnyIterator::Boolean(it) => it.stats(),
        }
    }

    /// Release the iterator and its upstreams. Idempotent.
    pub fn close(&mut self) {
        match self {
            AnyIterator::Float(it) => it.close(),
            AnyIterator::Integer(it) => it.close(),
            AnyIterator::String(it) => it.close(),
            AnyIterator::Boolean(it) => it.close(),
        }
    }

    /// Lower into a typed iterator, or report which call rejected the type
    pub fn expect<V: IteratorValue>(self, call: &str) -> Result<Box<dyn PointIterator<V>>> {
        let kind = self.data_type();
        V::unwrap_iterator(self)
            .ok_or_else(|| QueryError::unsupported_call(call, kind))
    }

    /// Drain every remaining point, then close
    pub fn drain(&mut self) {
        while let Ok(Some(_)) = self.next_any() {}
        self.close();
    }
}

/// Typed extraction out of [`AnyIterator`], implemented per point kind.
pub trait IteratorValue: PointValue {
    /// Take the typed iterator out of the erased handle, if kinds match
    fn unwrap_iterator(it: AnyIterator) -> Option<Box<dyn PointIterator<Self>>>;
    /// Wrap a typed boxed iterator back into the erased handle
    fn wrap_iterator(it: Box<dyn PointIterator<Self>>) -> AnyIterator;
}

impl IteratorValue for f64 {
    fn unwrap_iterator(it: AnyIterator) -> Option<Box<dyn PointIterator<Self>>> {
        match it {
            AnyIterator::Float(b) => Some(b),
            _ => None,
        }
    }

    fn wrap_iterator(it: Box<dyn PointIterator<Self>>) -> AnyIterator {
        AnyIterator::Float(it)
    }
}

impl IteratorValue for i64 {
    fn unwrap_iterator(it: AnyIterator) -> Option<Box<dyn PointIterator<Self>>> {
        match it {
            AnyIterator::Integer(b) => Some(b),
            _ => None,
        }
    }

    fn wrap_iterator(it: Box<dyn PointIterator<Self>>) -> AnyIterator {
        AnyIterator::Integer(it)
    }
}

impl IteratorValue for String {
    fn unwrap_iterator(it: AnyIterator) -> Option<Box<dyn PointIterator<Self>>> {
        match it {
            AnyIterator::String(b) => Some(b),
            _ => None,
        }
    }

    fn wrap_iterator(it: Box<dyn PointIterator<Self>>) -> AnyIterator {
        AnyIterator::String(it)
    }
}

impl IteratorValue for bool {
    fn unwrap_iterator(it: AnyIterator) -> Option<Box<dyn PointIterator<Self>>> {
        match it {
            AnyIterator::Boolean(b) => Some(b),
            _ => None,
        }
    }

    fn wrap_iterator(it: Box<dyn PointIterator<Self>>) -> AnyIterator {
        AnyIterator::Boolean(it)
    }
}

/// A list of same-kind iterators, typically one per shard or source.
pub struct Iterators(pub Vec<AnyIterator>);

impl Iterators {
    /// Merge the iterators into a single ordered stream.
    ///
    /// Raw streams (no call in `options.expr`) merge point-by-point in
    /// `(name, tags, time)` order. Call streams merge window-run by
    /// window-run and are re-reduced so per-shard partial aggregates
    /// combine; a `count` combine re-applies as `sum` since partial counts
    /// add.
    pub fn merge(self, opt: &IteratorOptions) -> Result<AnyIterator> {
        use crate::ast::Expr;
        use crate::operators::call::new_call_iterator;
        use crate::operators::merge::{merge_iterator, sorted_merge_iterator};

        let mut inputs = self.0;
        let kind = match inputs.first() {
            Some(it) => it.data_type(),
            None => {
                return Err(QueryError::InvalidStatement(
                    "no iterators to merge".into(),
                ))
            }
        };
        if let Some(other) = inputs.iter().find(|it| it.data_type() != kind) {
            let other = other.data_type();
            for it in &mut inputs {
                it.close();
            }
            return Err(QueryError::MixedTypeMerge(kind, other));
        }

        if opt.merge_sorted() {
            return sorted_merge_iterator(inputs, opt);
        }

        let merged = merge_iterator(inputs, opt)?;

        // Partial counts from different shards add together.
        let mut combine_opt = opt.clone();
        if let Some(Expr::Call { name, args }) = combine_opt.expr.clone() {
            if name == "count" {
                combine_opt.expr = Some(Expr::Call {
                    name: "sum".into(),
                    args,
                });
            }
        }
        new_call_iterator(merged, &combine_opt)
    }
}

/// Exhaust and close every iterator in the list.
pub fn drain_iterators(iterators: Vec<AnyIterator>) {
    for mut it in iterators {
        it.drain();
    }
}
