//! Windowed call iterator for the associative aggregate set
//!
//! [`new_call_iterator`] promotes a raw (or partially aggregated) stream
//! into one that reduces each `(name, tags, window)` group with a fixed
//! function: `count`, `sum`, `min`, `max`, `first`, `last` or `mean`.
//! Shards apply it before the merge; [`crate::iterator::Iterators::merge`]
//! applies it again after, so per-shard partials combine into final values.
//!
//! The same windowed-group engine ([`WindowedReduceIterator`]) drives the
//! buffered reducers in [`super::reduce`] and the selectors in
//! [`super::selector`]; only the [`Reducer`] implementations differ.
//!
//! Reducers see every point of a group and emit zero or more values when
//! the group closes. `min`/`max`/`first`/`last` keep the winning point's
//! original time and aux cells — snapping to window starts is a separate
//! planner-applied wrapper, so selector layers stacked above still observe
//! source timestamps.

use crate::ast::Expr;
use crate::error::{QueryError, Result};
use crate::iterator::{
    AnyIterator, Buffered, IteratorStats, IteratorValue, PointIterator,
};
use crate::options::IteratorOptions;
use crate::point::{CellValue, NumericValue, Point, PointValue, Tags};
use std::collections::{BTreeMap, VecDeque};
use std::marker::PhantomData;

/// One value emitted by a reducer when its group closes.
pub(crate) struct EmitPoint<O> {
    /// Emission timestamp
    pub time: i64,
    /// Value, `None` for a nil point
    pub value: Option<O>,
    /// Carried aux cells
    pub aux: Vec<CellValue>,
    /// Contribution counter
    pub aggregated: u32,
}

impl<O> EmitPoint<O> {
    pub(crate) fn value(time: i64, value: O, aggregated: u32) -> Self {
        Self {
            time,
            value: Some(value),
            aux: Vec::new(),
            aggregated,
        }
    }

    pub(crate) fn nil(time: i64) -> Self {
        Self {
            time,
            value: None,
            aux: Vec::new(),
            aggregated: 0,
        }
    }
}

/// Per-window reduction state.
///
/// A fresh reducer is created for every `(name, tags, window)` group; nil
/// input points never reach it.
pub(crate) trait Reducer<V: PointValue, O: PointValue>: Send {
    /// Fold one point into the state
    fn aggregate(&mut self, point: &Point<V>);

    /// Close the group and emit its values. `window_start` is the group's
    /// bucket start (0 with windowing disabled).
    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<O>>;
}

/// Contribution accounting shared by every reducer: a partial counts for
/// the raw points behind it, a raw point counts for one.
pub(crate) fn contribution(point_aggregated: u32) -> u32 {
    point_aggregated.max(1)
}

/// The windowed-group engine.
///
/// The input is consumed one **window batch** at a time: a maximal run of
/// points sharing one window bucket. Within a batch, points group by
/// `(name, tags-subset)` into per-series reducers — the subset being
/// `options.effective_dimensions()`, so selector tag carry-over widens the
/// grouping without affecting merge order. When the batch ends, each
/// series' reducer emits, ordered by series key within the batch.
///
/// Series-major streams (merge ordered by tags) therefore emit
/// series-major; window-major streams (no ordering dimensions) emit
/// window-major with every series of a window grouped exactly once.
pub(crate) struct WindowedReduceIterator<V: PointValue, O: PointValue, R: Reducer<V, O>> {
    input: Buffered<V>,
    make: Box<dyn Fn() -> R + Send>,
    opt: IteratorOptions,
    dims: Vec<String>,
    pending: VecDeque<Point<O>>,
    done: bool,
    closed: bool,
    _marker: PhantomData<O>,
}

impl<V: PointValue, O: PointValue, R: Reducer<V, O>> WindowedReduceIterator<V, O, R> {
    pub(crate) fn new(
        input: Box<dyn PointIterator<V>>,
        opt: &IteratorOptions,
        make: impl Fn() -> R + Send + 'static,
    ) -> Self {
        Self {
            input: Buffered::new(input),
            make: Box::new(make),
            opt: opt.clone(),
            dims: opt.effective_dimensions(),
            pending: VecDeque::new(),
            done: false,
            closed: false,
            _marker: PhantomData,
        }
    }

    /// Consume one window batch and queue its reduced points.
    fn reduce_batch(&mut self) -> Result<()> {
        // Find the first value-carrying point; aggregates ignore nils.
        let first = loop {
            match self.input.next_point()? {
                Some(p) if p.nil => continue,
                Some(p) => break p,
                None => {
                    self.done = true;
                    return Ok(());
                }
            }
        };
        let window = self.opt.window(first.time).0;

        let mut groups: BTreeMap<(String, String), (Tags, R)> = BTreeMap::new();
        let insert = |groups: &mut BTreeMap<(String, String), (Tags, R)>,
                      make: &(dyn Fn() -> R + Send),
                      dims: &[String],
                      p: &Point<V>| {
            let tags = p.tags.subset(dims);
            let key = (p.name.clone(), tags.id());
            let (_, reducer) = groups
                .entry(key)
                .or_insert_with(|| (tags, make()));
            reducer.aggregate(p);
        };
        insert(&mut groups, self.make.as_ref(), &self.dims, &first);

        loop {
            let in_window = match self.input.peek()? {
                Some(p) => p.nil || self.opt.window(p.time).0 == window,
                None => false,
            };
            if !in_window {
                break;
            }
            match self.input.next_point()? {
                Some(p) if p.nil => continue,
                Some(p) => insert(&mut groups, self.make.as_ref(), &self.dims, &p),
                None => break,
            }
        }

        let window_start = if self.opt.interval.is_zero() { 0 } else { window };
        for ((name, _), (tags, mut reducer)) in groups {
            for e in reducer.emit(window_start) {
                self.pending.push_back(Point {
                    name: name.clone(),
                    tags: tags.clone(),
                    time: e.time,
                    value: e.value.clone().unwrap_or_else(O::zero),
                    nil: e.value.is_none(),
                    aux: e.aux,
                    aggregated: e.aggregated,
                });
            }
        }
        Ok(())
    }
}

impl<V: PointValue, O: PointValue, R: Reducer<V, O>> PointIterator<O>
    for WindowedReduceIterator<V, O, R>
{
    fn next_point(&mut self) -> Result<Option<Point<O>>> {
        loop {
            if let Some(p) = self.pending.pop_front() {
                return Ok(Some(p));
            }
            if self.done || self.closed {
                return Ok(None);
            }
            self.reduce_batch()?;
        }
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.input.close();
    }
}

// ============================================================================
// Call reducers
// ============================================================================

/// `count` — integer output for every input kind
struct CountReducer<V> {
    count: i64,
    aggregated: u32,
    _marker: PhantomData<V>,
}

impl<V> CountReducer<V> {
    fn new() -> Self {
        Self {
            count: 0,
            aggregated: 0,
            _marker: PhantomData,
        }
    }
}

impl<V: PointValue> Reducer<V, i64> for CountReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        let n = contribution(point.aggregated);
        self.count += n as i64;
        self.aggregated += n;
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<i64>> {
        vec![EmitPoint::value(window_start, self.count, self.aggregated)]
    }
}

/// `sum` — numeric, output type matches input
struct SumReducer<V: NumericValue> {
    sum: Option<V>,
    aggregated: u32,
}

impl<V: NumericValue> SumReducer<V> {
    fn new() -> Self {
        Self {
            sum: None,
            aggregated: 0,
        }
    }
}

impl<V: NumericValue> Reducer<V, V> for SumReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.sum = Some(match &self.sum {
            Some(s) => s.add(&point.value),
            None => point.value.clone(),
        });
        self.aggregated += contribution(point.aggregated);
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<V>> {
        match self.sum.take() {
            Some(sum) => vec![EmitPoint::value(window_start, sum, self.aggregated)],
            None => Vec::new(),
        }
    }
}

/// `min` / `max` — running extreme, ties to the earlier time; keeps the
/// winning point's original time and aux cells
struct ExtremeReducer<V: PointValue> {
    best: Option<(i64, V, Vec<CellValue>)>,
    aggregated: u32,
    is_max: bool,
}

impl<V: PointValue> ExtremeReducer<V> {
    fn new(is_max: bool) -> Self {
        Self {
            best: None,
            aggregated: 0,
            is_max,
        }
    }
}

impl<V: PointValue> Reducer<V, V> for ExtremeReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.aggregated += contribution(point.aggregated);
        let better = match &self.best {
            None => true,
            Some((time, value, _)) => {
                let ord = point.value.cmp_values(value);
                let wins = if self.is_max {
                    ord == std::cmp::Ordering::Greater
                } else {
                    ord == std::cmp::Ordering::Less
                };
                wins || (ord == std::cmp::Ordering::Equal && point.time < *time)
            }
        };
        if better {
            self.best = Some((point.time, point.value.clone(), point.aux.clone()));
        }
    }

    fn emit(&mut self, _window_start: i64) -> Vec<EmitPoint<V>> {
        match self.best.take() {
            Some((time, value, aux)) => vec![EmitPoint {
                time,
                value: Some(value),
                aux,
                aggregated: self.aggregated,
            }],
            None => Vec::new(),
        }
    }
}

/// `first` / `last` — earliest / latest point; keeps original time and aux
struct EdgeReducer<V: PointValue> {
    best: Option<(i64, V, Vec<CellValue>)>,
    aggregated: u32,
    is_last: bool,
}

impl<V: PointValue> EdgeReducer<V> {
    fn new(is_last: bool) -> Self {
        Self {
            best: None,
            aggregated: 0,
            is_last,
        }
    }
}

impl<V: PointValue> Reducer<V, V> for EdgeReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.aggregated += contribution(point.aggregated);
        let better = match &self.best {
            None => true,
            Some((time, _, _)) => {
                if self.is_last {
                    point.time > *time
                } else {
                    point.time < *time
                }
            }
        };
        if better {
            self.best = Some((point.time, point.value.clone(), point.aux.clone()));
        }
    }

    fn emit(&mut self, _window_start: i64) -> Vec<EmitPoint<V>> {
        match self.best.take() {
            Some((time, value, aux)) => vec![EmitPoint {
                time,
                value: Some(value),
                aux,
                aggregated: self.aggregated,
            }],
            None => Vec::new(),
        }
    }
}

/// `mean` — float output; a partial with `aggregated >= 2` contributes as a
/// weighted observation so two-stage combining stays exact
struct MeanReducer<V: NumericValue> {
    sum: f64,
    count: u64,
    aggregated: u32,
    _marker: PhantomData<V>,
}

impl<V: NumericValue> MeanReducer<V> {
    fn new() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            aggregated: 0,
            _marker: PhantomData,
        }
    }
}

impl<V: NumericValue> Reducer<V, f64> for MeanReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        let v = point.value.to_f64();
        if point.aggregated >= 2 {
            self.sum += v * point.aggregated as f64;
            self.count += point.aggregated as u64;
        } else {
            self.sum += v;
            self.count += 1;
        }
        self.aggregated += contribution(point.aggregated);
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<f64>> {
        if self.count == 0 {
            return Vec::new();
        }
        vec![EmitPoint::value(
            window_start,
            self.sum / self.count as f64,
            self.aggregated,
        )]
    }
}

// ============================================================================
// Constructor
// ============================================================================

fn count_over<V: IteratorValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
) -> AnyIterator {
    AnyIterator::integer(WindowedReduceIterator::new(input, opt, CountReducer::<V>::new))
}

fn sum_over<V: IteratorValue + NumericValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
) -> AnyIterator {
    V::wrap_iterator(Box::new(WindowedReduceIterator::new(
        input,
        opt,
        SumReducer::<V>::new,
    )))
}

fn extreme_over<V: IteratorValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    is_max: bool,
) -> AnyIterator {
    V::wrap_iterator(Box::new(WindowedReduceIterator::new(input, opt, move || {
        ExtremeReducer::<V>::new(is_max)
    })))
}

fn edge_over<V: IteratorValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    is_last: bool,
) -> AnyIterator {
    V::wrap_iterator(Box::new(WindowedReduceIterator::new(input, opt, move || {
        EdgeReducer::<V>::new(is_last)
    })))
}

fn mean_over<V: IteratorValue + NumericValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
) -> AnyIterator {
    AnyIterator::float(WindowedReduceIterator::new(input, opt, MeanReducer::<V>::new))
}

/// Promote a stream into one that reduces each window with the call in
/// `options.expr`.
///
/// Supports the associative aggregate set (`count`, `sum`, `min`, `max`,
/// `first`, `last`) plus `mean`; other functions are built by the planner
/// from the buffered reducers. Unsupported type/function combinations fail
/// here with a construction error.
pub fn new_call_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    let call_name = match opt.expr.as_ref().map(|e| e.unparenthesize()) {
        Some(Expr::Call { name, .. }) => name.clone(),
        other => {
            return Err(QueryError::UnsupportedExpression(format!(
                "call iterator requires a function call, got {:?}",
                other.map(|e| e.to_string())
            )))
        }
    };
    let kind = input.data_type();

    match call_name.as_str() {
        "count" => Ok(match input {
            AnyIterator::Float(b) => count_over(b, opt),
            AnyIterator::Integer(b) => count_over(b, opt),
            AnyIterator::String(b) => count_over(b, opt),
            AnyIterator::Boolean(b) => count_over(b, opt),
        }),
        "sum" => match input {
            AnyIterator::Float(b) => Ok(sum_over(b, opt)),
            AnyIterator::Integer(b) => Ok(sum_over(b, opt)),
            _ => Err(QueryError::unsupported_call("sum", kind)),
        },
        "min" | "max" => {
            let is_max = call_name == "max";
            match input {
                AnyIterator::Float(b) => Ok(extreme_over(b, opt, is_max)),
                AnyIterator::Integer(b) => Ok(extreme_over(b, opt, is_max)),
                AnyIterator::Boolean(b) => Ok(extreme_over(b, opt, is_max)),
                _ => Err(QueryError::unsupported_call(call_name, kind)),
            }
        }
        "first" | "last" => {
            let is_last = call_name == "last";
            Ok(match input {
                AnyIterator::Float(b) => edge_over(b, opt, is_last),
                AnyIterator::Integer(b) => edge_over(b, opt, is_last),
                AnyIterator::String(b) => edge_over(b, opt, is_last),
                AnyIterator::Boolean(b) => edge_over(b, opt, is_last),
            })
        }
        "mean" => match input {
            AnyIterator::Float(b) => Ok(mean_over(b, opt)),
            AnyIterator::Integer(b) => Ok(mean_over(b, opt)),
            _ => Err(QueryError::unsupported_call("mean", kind)),
        },
        other => Err(QueryError::UnsupportedExpression(format!(
            "unsupported function call: {}",
            other
        ))),
    }
}
