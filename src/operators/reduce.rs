//! Buffered per-window reducers
//!
//! These aggregations need every value of a window in hand before they can
//! emit: `distinct`, `median`, `mode`, `stddev`, `spread`, `percentile` and
//! `sample`. They run on the merged raw stream (the planner does not push
//! them down to shards) on top of the same windowed-group engine as the
//! call iterator.

use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, IteratorValue, PointIterator};
use crate::operators::call::{EmitPoint, Reducer, WindowedReduceIterator};
use crate::options::IteratorOptions;
use crate::point::{CellValue, NumericValue, Point, PointValue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;

/// `distinct` — each value once per window, first-observation order,
/// stamped with the window start
struct DistinctReducer<V: PointValue> {
    values: Vec<V>,
}

impl<V: PointValue> Reducer<V, V> for DistinctReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        if !self.values.contains(&point.value) {
            self.values.push(point.value.clone());
        }
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<V>> {
        std::mem::take(&mut self.values)
            .into_iter()
            .map(|v| EmitPoint::value(window_start, v, 0))
            .collect()
    }
}

/// `median` — float output; even counts average the two middle values
struct MedianReducer {
    values: Vec<f64>,
}

impl<V: NumericValue> Reducer<V, f64> for MedianReducer {
    fn aggregate(&mut self, point: &Point<V>) {
        self.values.push(point.value.to_f64());
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<f64>> {
        if self.values.is_empty() {
            return Vec::new();
        }
        self.values.sort_by(|a, b| a.total_cmp(b));
        let n = self.values.len();
        let median = if n % 2 == 1 {
            self.values[n / 2]
        } else {
            (self.values[n / 2 - 1] + self.values[n / 2]) / 2.0
        };
        self.values.clear();
        vec![EmitPoint::value(window_start, median, 0)]
    }
}

/// `mode` — most frequent value; ties break to the value observed first
struct ModeReducer<V: PointValue> {
    entries: Vec<(V, u64, i64)>,
}

impl<V: PointValue> Reducer<V, V> for ModeReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        for (value, count, _) in self.entries.iter_mut() {
            if *value == point.value {
                *count += 1;
                return;
            }
        }
        self.entries.push((point.value.clone(), 1, point.time));
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<V>> {
        let mut best: Option<(V, u64, i64)> = None;
        for (value, count, first_time) in std::mem::take(&mut self.entries) {
            let wins = match &best {
                None => true,
                Some((_, best_count, best_time)) => {
                    count > *best_count || (count == *best_count && first_time < *best_time)
                }
            };
            if wins {
                best = Some((value, count, first_time));
            }
        }
        match best {
            Some((value, _, _)) => vec![EmitPoint::value(window_start, value, 0)],
            None => Vec::new(),
        }
    }
}

/// `stddev` — Bessel-corrected two-pass; windows with fewer than two values
/// emit a nil point rather than being omitted
struct StddevReducer {
    values: Vec<f64>,
}

impl<V: NumericValue> Reducer<V, f64> for StddevReducer {
    fn aggregate(&mut self, point: &Point<V>) {
        self.values.push(point.value.to_f64());
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<f64>> {
        let values = std::mem::take(&mut self.values);
        if values.len() < 2 {
            return vec![EmitPoint::nil(window_start)];
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
        vec![EmitPoint::value(window_start, variance.sqrt(), 0)]
    }
}

/// `spread` — max minus min, output type matches input
struct SpreadReducer<V: NumericValue> {
    min: Option<V>,
    max: Option<V>,
}

impl<V: NumericValue> Reducer<V, V> for SpreadReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        let v = &point.value;
        if self
            .min
            .as_ref()
            .map_or(true, |m| v.cmp_values(m) == Ordering::Less)
        {
            self.min = Some(v.clone());
        }
        if self
            .max
            .as_ref()
            .map_or(true, |m| v.cmp_values(m) == Ordering::Greater)
        {
            self.max = Some(v.clone());
        }
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<V>> {
        match (self.min.take(), self.max.take()) {
            (Some(min), Some(max)) => {
                vec![EmitPoint::value(window_start, max.sub(&min), 0)]
            }
            _ => Vec::new(),
        }
    }
}

/// `percentile(p)` — exact selection over the sorted window values:
/// `idx = ceil(p/100 * n) - 1`, clamped; output type matches input
struct PercentileReducer<V: PointValue> {
    values: Vec<V>,
    percentile: f64,
}

impl<V: PointValue> Reducer<V, V> for PercentileReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.values.push(point.value.clone());
    }

    fn emit(&mut self, window_start: i64) -> Vec<EmitPoint<V>> {
        let mut values = std::mem::take(&mut self.values);
        if values.is_empty() {
            return vec![EmitPoint::nil(window_start)];
        }
        values.sort_by(|a, b| a.cmp_values(b));
        let n = values.len();
        let idx = ((self.percentile / 100.0) * n as f64).ceil() as isize - 1;
        let idx = idx.clamp(0, n as isize - 1) as usize;
        vec![EmitPoint::value(window_start, values[idx].clone(), 0)]
    }
}

/// `sample(k)` — Vitter's algorithm R reservoir per window; emitted points
/// keep their original times and aux cells, ordered by time
struct SampleReducer<V: PointValue> {
    reservoir: Vec<(i64, V, Vec<CellValue>)>,
    seen: u64,
    k: usize,
    rng: StdRng,
}

impl<V: PointValue> Reducer<V, V> for SampleReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.seen += 1;
        if self.reservoir.len() < self.k {
            self.reservoir
                .push((point.time, point.value.clone(), point.aux.clone()));
            return;
        }
        let j = self.rng.gen_range(0..self.seen) as usize;
        if j < self.k {
            self.reservoir[j] = (point.time, point.value.clone(), point.aux.clone());
        }
    }

    fn emit(&mut self, _window_start: i64) -> Vec<EmitPoint<V>> {
        self.seen = 0;
        let mut sampled = std::mem::take(&mut self.reservoir);
        sampled.sort_by_key(|(time, _, _)| *time);
        sampled
            .into_iter()
            .map(|(time, value, aux)| EmitPoint {
                time,
                value: Some(value),
                aux,
                aggregated: 0,
            })
            .collect()
    }
}

// ============================================================================
// Constructors
// ============================================================================

fn same_kind<V, R>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    make: impl Fn() -> R + Send + 'static,
) -> AnyIterator
where
    V: IteratorValue,
    R: Reducer<V, V> + 'static,
{
    V::wrap_iterator(Box::new(WindowedReduceIterator::new(input, opt, make)))
}

fn to_float<V, R>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    make: impl Fn() -> R + Send + 'static,
) -> AnyIterator
where
    V: IteratorValue,
    R: Reducer<V, f64> + 'static,
{
    AnyIterator::float(WindowedReduceIterator::new(input, opt, make))
}

/// Build a `distinct` iterator; defined for every input kind
pub fn new_distinct_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    Ok(match input {
        AnyIterator::Float(b) => same_kind(b, opt, || DistinctReducer { values: Vec::new() }),
        AnyIterator::Integer(b) => same_kind(b, opt, || DistinctReducer { values: Vec::new() }),
        AnyIterator::String(b) => same_kind(b, opt, || DistinctReducer { values: Vec::new() }),
        AnyIterator::Boolean(b) => same_kind(b, opt, || DistinctReducer { values: Vec::new() }),
    })
}

/// Build a `median` iterator; numeric inputs only, float output
pub fn new_median_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(to_float(b, opt, || MedianReducer { values: Vec::new() })),
        AnyIterator::Integer(b) => Ok(to_float(b, opt, || MedianReducer { values: Vec::new() })),
        _ => Err(QueryError::unsupported_call("median", kind)),
    }
}

/// Build a `mode` iterator; defined for every input kind
pub fn new_mode_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    Ok(match input {
        AnyIterator::Float(b) => same_kind(b, opt, || ModeReducer { entries: Vec::new() }),
        AnyIterator::Integer(b) => same_kind(b, opt, || ModeReducer { entries: Vec::new() }),
        AnyIterator::String(b) => same_kind(b, opt, || ModeReducer { entries: Vec::new() }),
        AnyIterator::Boolean(b) => same_kind(b, opt, || ModeReducer { entries: Vec::new() }),
    })
}

/// Build a `stddev` iterator; numeric inputs only, float output
pub fn new_stddev_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(to_float(b, opt, || StddevReducer { values: Vec::new() })),
        AnyIterator::Integer(b) => Ok(to_float(b, opt, || StddevReducer { values: Vec::new() })),
        _ => Err(QueryError::unsupported_call("stddev", kind)),
    }
}

/// Build a `spread` iterator; numeric inputs only, output matches input
pub fn new_spread_iterator(input: AnyIterator, opt: &IteratorOptions) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(same_kind(b, opt, || SpreadReducer {
            min: None,
            max: None,
        })),
        AnyIterator::Integer(b) => Ok(same_kind(b, opt, || SpreadReducer {
            min: None,
            max: None,
        })),
        _ => Err(QueryError::unsupported_call("spread", kind)),
    }
}

/// Build a `percentile(p)` iterator; numeric inputs only, output matches input
pub fn new_percentile_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    percentile: f64,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(same_kind(b, opt, move || PercentileReducer {
            values: Vec::new(),
            percentile,
        })),
        AnyIterator::Integer(b) => Ok(same_kind(b, opt, move || PercentileReducer {
            values: Vec::new(),
            percentile,
        })),
        _ => Err(QueryError::unsupported_call("percentile", kind)),
    }
}

/// Build a `sample(k)` iterator; defined for every input kind
pub fn new_sample_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    k: usize,
) -> Result<AnyIterator> {
    fn make<V: PointValue>(k: usize) -> impl Fn() -> SampleReducer<V> + Send + 'static {
        move || SampleReducer {
            reservoir: Vec::with_capacity(k),
            seen: 0,
            k,
            rng: StdRng::from_entropy(),
        }
    }
    Ok(match input {
        AnyIterator::Float(b) => same_kind(b, opt, make::<f64>(k)),
        AnyIterator::Integer(b) => same_kind(b, opt, make::<i64>(k)),
        AnyIterator::String(b) => same_kind(b, opt, make::<String>(k)),
        AnyIterator::Boolean(b) => same_kind(b, opt, make::<bool>(k)),
    })
}
