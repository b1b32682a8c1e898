//! Per-series transform iterators
//!
//! Transforms walk one series at a time in time order and emit one output
//! per input point or fewer: the derivative family, `elapsed`,
//! `moving_average`, `cumulative_sum` and `integral`. Series boundaries
//! (a change of `(name, tags)`) reset transform state; nil input points are
//! skipped without resetting history.

use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, IteratorStats, IteratorValue, PointIterator};
use crate::options::IteratorOptions;
use crate::point::{NumericValue, Point, PointValue, Tags};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// One output of a transform step: time, value, contribution counter.
type Emit<O> = (i64, O, u32);

/// Per-series transform state machine.
trait SeriesState<V: PointValue, O: PointValue>: Send {
    /// Fold in the next point of the current series, emitting any outputs
    /// it completes.
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<O>>;

    /// The series ended; emit anything still pending and reset.
    fn finish(&mut self) -> Vec<Emit<O>> {
        Vec::new()
    }

    /// Drop state for a new series.
    fn reset(&mut self);
}

/// Engine running one [`SeriesState`] per `(name, tags)` series.
struct TransformIterator<V: PointValue, O: PointValue, S: SeriesState<V, O>> {
    input: Box<dyn PointIterator<V>>,
    state: S,
    dimensions: Vec<String>,
    current: Option<(String, String)>,
    series_name: String,
    series_tags: Tags,
    pending: VecDeque<Point<O>>,
    done: bool,
    closed: bool,
    _marker: PhantomData<(V, O)>,
}

impl<V: PointValue, O: PointValue, S: SeriesState<V, O>> TransformIterator<V, O, S> {
    fn new(input: Box<dyn PointIterator<V>>, opt: &IteratorOptions, state: S) -> Self {
        Self {
            input,
            state,
            dimensions: opt.effective_dimensions(),
            current: None,
            series_name: String::new(),
            series_tags: Tags::new(),
            pending: VecDeque::new(),
            done: false,
            closed: false,
            _marker: PhantomData,
        }
    }

    fn push_emits(&mut self, emits: Vec<Emit<O>>) {
        for (time, value, aggregated) in emits {
            self.pending.push_back(Point {
                name: self.series_name.clone(),
                tags: self.series_tags.clone(),
                time,
                value,
                nil: false,
                aux: Vec::new(),
                aggregated,
            });
        }
    }
}

impl<V: PointValue, O: PointValue, S: SeriesState<V, O>> PointIterator<O>
    for TransformIterator<V, O, S>
{
    fn next_point(&mut self) -> Result<Option<Point<O>>> {
        loop {
            if let Some(p) = self.pending.pop_front() {
                return Ok(Some(p));
            }
            if self.done || self.closed {
                return Ok(None);
            }
            match self.input.next_point()? {
                Some(p) => {
                    if p.nil {
                        continue;
                    }
                    let key = (p.name.clone(), p.tags.subset(&self.dimensions).id());
                    if self.current.as_ref() != Some(&key) {
                        if self.current.is_some() {
                            let emits = self.state.finish();
                            self.push_emits(emits);
                        }
                        self.state.reset();
                        self.series_name = p.name.clone();
                        self.series_tags = p.tags.subset(&self.dimensions);
                        self.current = Some(key);
                    }
                    let emits = self.state.push(&p);
                    self.push_emits(emits);
                }
                None => {
                    self.done = true;
                    if self.current.is_some() {
                        let emits = self.state.finish();
                        self.push_emits(emits);
                    }
                }
            }
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
// Derivative / difference
// ============================================================================

/// `derivative(value, unit)` — per-unit rate between consecutive points.
/// Duplicate timestamps collapse to the first occurrence and emit nothing.
struct DerivativeState<V: NumericValue> {
    unit: i64,
    non_negative: bool,
    ascending: bool,
    prev: Option<(i64, f64)>,
    _marker: PhantomData<V>,
}

impl<V: NumericValue> SeriesState<V, f64> for DerivativeState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<f64>> {
        let value = point.value.to_f64();
        let Some((prev_time, prev_value)) = self.prev else {
            self.prev = Some((point.time, value));
            return Vec::new();
        };
        if point.time == prev_time {
            return Vec::new();
        }
        let diff = value - prev_value;
        let mut elapsed = point.time - prev_time;
        if !self.ascending {
            elapsed = -elapsed;
        }
        self.prev = Some((point.time, value));
        if self.non_negative && diff < 0.0 {
            return Vec::new();
        }
        let rate = diff / (elapsed as f64 / self.unit as f64);
        vec![(point.time, rate, 0)]
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// `difference(value)` — value delta between consecutive points, input type
/// preserved; duplicate timestamps collapse like the derivative.
struct DifferenceState<V: NumericValue> {
    non_negative: bool,
    prev: Option<(i64, V)>,
}

impl<V: NumericValue> SeriesState<V, V> for DifferenceState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<V>> {
        let Some((prev_time, prev_value)) = self.prev.clone() else {
            self.prev = Some((point.time, point.value.clone()));
            return Vec::new();
        };
        if point.time == prev_time {
            return Vec::new();
        }
        self.prev = Some((point.time, point.value.clone()));
        let diff = point.value.sub(&prev_value);
        if self.non_negative && diff.cmp_values(&V::zero()) == std::cmp::Ordering::Less {
            return Vec::new();
        }
        vec![(point.time, diff, 0)]
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// `elapsed(value, unit)` — time delta between consecutive points as an
/// integer; defined for every input kind.
struct ElapsedState<V: PointValue> {
    unit: i64,
    prev: Option<i64>,
    _marker: PhantomData<V>,
}

impl<V: PointValue> SeriesState<V, i64> for ElapsedState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<i64>> {
        let Some(prev_time) = self.prev else {
            self.prev = Some(point.time);
            return Vec::new();
        };
        self.prev = Some(point.time);
        vec![(point.time, (point.time - prev_time) / self.unit, 0)]
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// `moving_average(value, N)` — float running mean of the last N points,
/// no output until N points arrive.
struct MovingAverageState<V: NumericValue> {
    n: usize,
    window: VecDeque<f64>,
    _marker: PhantomData<V>,
}

impl<V: NumericValue> SeriesState<V, f64> for MovingAverageState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<f64>> {
        self.window.push_back(point.value.to_f64());
        if self.window.len() > self.n {
            self.window.pop_front();
        }
        if self.window.len() < self.n {
            return Vec::new();
        }
        let mean = self.window.iter().sum::<f64>() / self.n as f64;
        vec![(point.time, mean, self.n as u32)]
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// `cumulative_sum(value)` — running sum per series, input type preserved.
struct CumulativeSumState<V: NumericValue> {
    sum: Option<V>,
}

impl<V: NumericValue> SeriesState<V, V> for CumulativeSumState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<V>> {
        let sum = match &self.sum {
            Some(s) => s.add(&point.value),
            None => point.value.clone(),
        };
        self.sum = Some(sum.clone());
        vec![(point.time, sum, 0)]
    }

    fn reset(&mut self) {
        self.sum = None;
    }
}

/// `integral(value[, unit])` — trapezoidal integration over time.
///
/// With time windowing, the boundary between windows is interpolated from
/// the points on either side. A duplicate timestamp contributes no area but
/// replaces the left endpoint.
struct IntegralState<V: NumericValue> {
    unit: i64,
    interval_every: i64,
    interval_offset: i64,
    prev: Option<(i64, f64)>,
    window: Option<(i64, i64)>,
    sum: f64,
    _marker: PhantomData<V>,
}

impl<V: NumericValue> IntegralState<V> {
    fn window_of(&self, t: i64) -> (i64, i64) {
        if self.interval_every == 0 {
            return (i64::MIN, i64::MAX);
        }
        let every = self.interval_every;
        let mut dt = (t - self.interval_offset) % every;
        if dt < 0 {
            dt += every;
        }
        (t - dt, t - dt + every)
    }

    fn emit_time(&self, window_start: i64) -> i64 {
        if self.interval_every == 0 {
            0
        } else {
            window_start
        }
    }

    fn trapezoid(&self, v0: f64, v1: f64, dt: i64) -> f64 {
        (v0 + v1) / 2.0 * (dt.abs() as f64 / self.unit as f64)
    }
}

impl<V: NumericValue> SeriesState<V, f64> for IntegralState<V> {
    fn push(&mut self, point: &Point<V>) -> Vec<Emit<f64>> {
        let value = point.value.to_f64();
        let time = point.time;

        let Some((mut prev_time, mut prev_value)) = self.prev else {
            self.prev = Some((time, value));
            self.window = Some(self.window_of(time));
            self.sum = 0.0;
            return Vec::new();
        };

        if time == prev_time {
            // No width; the later value replaces the left endpoint.
            self.prev = Some((time, value));
            return Vec::new();
        }

        let mut emits = Vec::new();
        let mut window = self.window.unwrap_or_else(|| self.window_of(prev_time));

        // Cross each window boundary between prev and this point, assigning
        // the interpolated area on the near side to the closing window.
        while time >= window.1 {
            let boundary = window.1;
            let frac = (boundary - prev_time) as f64 / (time - prev_time) as f64;
            let boundary_value = prev_value + (value - prev_value) * frac;
            self.sum += self.trapezoid(prev_value, boundary_value, boundary - prev_time);
            emits.push((self.emit_time(window.0), self.sum, 0));

            prev_time = boundary;
            prev_value = boundary_value;
            window = self.window_of(boundary);
            self.sum = 0.0;
            if time == boundary {
                break;
            }
        }

        if time > prev_time {
            self.sum += self.trapezoid(prev_value, value, time - prev_time);
        }
        self.prev = Some((time, value));
        self.window = Some(window);
        emits
    }

    fn finish(&mut self) -> Vec<Emit<f64>> {
        let emits = match (self.prev, self.window) {
            (Some(_), Some(window)) => vec![(self.emit_time(window.0), self.sum, 0)],
            _ => Vec::new(),
        };
        self.reset();
        emits
    }

    fn reset(&mut self) {
        self.prev = None;
        self.window = None;
        self.sum = 0.0;
    }
}

// ============================================================================
// Constructors
// ============================================================================

fn numeric_to_float<V, S>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    state: S,
) -> AnyIterator
where
    V: IteratorValue + NumericValue,
    S: SeriesState<V, f64> + 'static,
{
    AnyIterator::float(TransformIterator::new(input, opt, state))
}

/// Build a `derivative` / `non_negative_derivative` iterator; numeric
/// inputs only, float output
pub fn new_derivative_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    unit: i64,
    non_negative: bool,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    let ascending = opt.ascending;
    match input {
        AnyIterator::Float(b) => Ok(numeric_to_float(
            b,
            opt,
            DerivativeState::<f64> {
                unit,
                non_negative,
                ascending,
                prev: None,
                _marker: PhantomData,
            },
        )),
        AnyIterator::Integer(b) => Ok(numeric_to_float(
            b,
            opt,
            DerivativeState::<i64> {
                unit,
                non_negative,
                ascending,
                prev: None,
                _marker: PhantomData,
            },
        )),
        _ => Err(QueryError::unsupported_call(
            if non_negative {
                "non_negative_derivative"
            } else {
                "derivative"
            },
            kind,
        )),
    }
}

/// Build a `difference` / `non_negative_difference` iterator; numeric
/// inputs only, output matches input
pub fn new_difference_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    non_negative: bool,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(AnyIterator::float(TransformIterator::new(
            b,
            opt,
            DifferenceState::<f64> {
                non_negative,
                prev: None,
            },
        ))),
        AnyIterator::Integer(b) => Ok(AnyIterator::integer(TransformIterator::new(
            b,
            opt,
            DifferenceState::<i64> {
                non_negative,
                prev: None,
            },
        ))),
        _ => Err(QueryError::unsupported_call(
            if non_negative {
                "non_negative_difference"
            } else {
                "difference"
            },
            kind,
        )),
    }
}

/// Build an `elapsed(value, unit)` iterator; any input kind, integer output
pub fn new_elapsed_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    unit: i64,
) -> Result<AnyIterator> {
    fn state<V: PointValue>(unit: i64) -> ElapsedState<V> {
        ElapsedState {
            unit,
            prev: None,
            _marker: PhantomData,
        }
    }
    Ok(match input {
        AnyIterator::Float(b) => {
            AnyIterator::integer(TransformIterator::new(b, opt, state::<f64>(unit)))
        }
        AnyIterator::Integer(b) => {
            AnyIterator::integer(TransformIterator::new(b, opt, state::<i64>(unit)))
        }
        AnyIterator::String(b) => {
            AnyIterator::integer(TransformIterator::new(b, opt, state::<String>(unit)))
        }
        AnyIterator::Boolean(b) => {
            AnyIterator::integer(TransformIterator::new(b, opt, state::<bool>(unit)))
        }
    })
}

/// Build a `moving_average(value, N)` iterator; numeric inputs only,
/// float output
pub fn new_moving_average_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    n: usize,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(numeric_to_float(
            b,
            opt,
            MovingAverageState::<f64> {
                n,
                window: VecDeque::with_capacity(n + 1),
                _marker: PhantomData,
            },
        )),
        AnyIterator::Integer(b) => Ok(numeric_to_float(
            b,
            opt,
            MovingAverageState::<i64> {
                n,
                window: VecDeque::with_capacity(n + 1),
                _marker: PhantomData,
            },
        )),
        _ => Err(QueryError::unsupported_call("moving_average", kind)),
    }
}

/// Build a `cumulative_sum(value)` iterator; numeric inputs only, output
/// matches input
pub fn new_cumulative_sum_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(AnyIterator::float(TransformIterator::new(
            b,
            opt,
            CumulativeSumState::<f64> { sum: None },
        ))),
        AnyIterator::Integer(b) => Ok(AnyIterator::integer(TransformIterator::new(
            b,
            opt,
            CumulativeSumState::<i64> { sum: None },
        ))),
        _ => Err(QueryError::unsupported_call("cumulative_sum", kind)),
    }
}

/// Build an `integral(value[, unit])` iterator; numeric inputs only,
/// float output
pub fn new_integral_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    unit: i64,
) -> Result<AnyIterator> {
    fn state<V: NumericValue>(unit: i64, opt: &IteratorOptions) -> IntegralState<V> {
        IntegralState {
            unit,
            interval_every: opt.interval.every,
            interval_offset: opt.interval.offset,
            prev: None,
            window: None,
            sum: 0.0,
            _marker: PhantomData,
        }
    }
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(numeric_to_float(b, opt, state::<f64>(unit, opt))),
        AnyIterator::Integer(b) => Ok(numeric_to_float(b, opt, state::<i64>(unit, opt))),
        _ => Err(QueryError::unsupported_call("integral", kind)),
    }
}
