//! Window gap filling
//!
//! Applied on top of an aggregation when the query declares both a time
//! interval and a fill mode other than `none`. For each series the bucket
//! cursor walks `[start_time, end_time)` in query direction; buckets the
//! aggregation produced pass through, missing buckets are synthesized
//! according to the fill mode. Points the aggregation emitted outside the
//! range pass through unchanged.
//!
//! Per-series fill state: the last non-nil value for `previous`, and the
//! surrounding real buckets for `linear`. Series boundaries reset it.

use crate::ast::Fill;
use crate::error::Result;
use crate::iterator::{
    AnyIterator, Buffered, IteratorStats, IteratorValue, PointIterator,
};
use crate::options::IteratorOptions;
use crate::point::{CellValue, Point, PointValue, Tags};

struct FillIterator<V: PointValue> {
    input: Buffered<V>,
    opt: IteratorOptions,
    mode: Fill,
    current: Option<(String, String)>,
    series_name: String,
    series_tags: Tags,
    cursor: i64,
    prev: Option<(i64, V)>,
    closed: bool,
}

impl<V: PointValue> FillIterator<V> {
    fn new(input: Box<dyn PointIterator<V>>, opt: &IteratorOptions, mode: Fill) -> Self {
        Self {
            input: Buffered::new(input),
            opt: opt.clone(),
            mode,
            current: None,
            series_name: String::new(),
            series_tags: Tags::new(),
            cursor: 0,
            prev: None,
            closed: false,
        }
    }

    /// First bucket of the range in query direction.
    fn first_bucket(&self) -> i64 {
        if self.opt.ascending {
            self.opt.window(self.opt.start_time).0
        } else {
            self.opt.window(self.opt.end_time - 1).0
        }
    }

    /// True while the cursor is still inside the queried range.
    fn cursor_in_range(&self) -> bool {
        if self.opt.ascending {
            self.cursor < self.opt.end_time
        } else {
            self.cursor >= self.opt.window(self.opt.start_time).0
        }
    }

    /// True when the cursor bucket comes before the point's bucket.
    fn cursor_precedes(&self, bucket: i64) -> bool {
        if self.opt.ascending {
            self.cursor < bucket
        } else {
            self.cursor > bucket
        }
    }

    /// Move the cursor just past the given bucket.
    fn advance_past(&mut self, bucket: i64) {
        let every = self.opt.interval.every;
        if self.opt.ascending {
            self.cursor = self.cursor.max(bucket.saturating_add(every));
        } else {
            self.cursor = self.cursor.min(bucket.saturating_sub(every));
        }
    }

    fn step(&mut self) {
        let every = self.opt.interval.every;
        if self.opt.ascending {
            self.cursor = self.cursor.saturating_add(every);
        } else {
            self.cursor = self.cursor.saturating_sub(every);
        }
    }

    /// A synthesized point for the cursor bucket. `next` is the upcoming
    /// real point of the same series, when one exists.
    fn synthesize(&self, next: Option<(i64, &V)>) -> Point<V> {
        let mut point = Point::<V>::null(self.series_name.clone(), self.cursor)
            .with_tags(self.series_tags.clone());
        match self.mode {
            Fill::None | Fill::Null => {}
            Fill::Number(v) => {
                if let Some(value) = number_value::<V>(v) {
                    point.value = value;
                    point.nil = false;
                }
            }
            Fill::Previous => {
                if let Some((_, value)) = &self.prev {
                    point.value = value.clone();
                    point.nil = false;
                }
            }
            Fill::Linear => {
                if let (Some((prev_bucket, prev_value)), Some((next_bucket, next_value))) =
                    (&self.prev, next)
                {
                    let span = next_bucket - prev_bucket;
                    if span != 0 {
                        let frac = (self.cursor - prev_bucket) as f64 / span as f64;
                        if let Some(value) = V::interpolate(prev_value, next_value, frac) {
                            point.value = value;
                            point.nil = false;
                        }
                    }
                }
            }
        }
        point
    }

    /// Pass an aggregate point through, applying the fill mode to nil
    /// aggregates and recording fill state.
    fn pass_through(&mut self, mut point: Point<V>, bucket: i64) -> Point<V> {
        if point.nil {
            match self.mode {
                Fill::Number(v) => {
                    if let Some(value) = number_value::<V>(v) {
                        point.value = value;
                        point.nil = false;
                    }
                }
                Fill::Previous => {
                    if let Some((_, value)) = &self.prev {
                        point.value = value.clone();
                        point.nil = false;
                    }
                }
                _ => {}
            }
        } else {
            self.prev = Some((bucket, point.value.clone()));
        }
        point
    }
}

fn number_value<V: PointValue>(v: f64) -> Option<V> {
    V::from_cell(&CellValue::Float(v)).or_else(|| V::from_cell(&CellValue::Integer(v as i64)))
}

impl<V: PointValue> PointIterator<V> for FillIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            let head = match self.input.peek()? {
                Some(p) => Some((
                    (p.name.clone(), p.tags.id()),
                    self.opt.window(p.time).0,
                    p.nil,
                    p.value.clone(),
                    p.tags.clone(),
                )),
                None => None,
            };

            match head {
                Some((key, bucket, nil, value, _)) if self.current.as_ref() == Some(&key) => {
                    if self.cursor_in_range() && self.cursor_precedes(bucket) {
                        let next = if nil { None } else { Some((bucket, &value)) };
                        let point = self.synthesize(next);
                        self.step();
                        return Ok(Some(point));
                    }
                    let point = match self.input.next_point()? {
                        Some(p) => p,
                        None => continue,
                    };
                    self.advance_past(bucket);
                    return Ok(Some(self.pass_through(point, bucket)));
                }
                Some((key, _, _, _, tags)) => {
                    // New series; finish filling the old one first.
                    if self.current.is_some() && self.cursor_in_range() {
                        let point = self.synthesize(None);
                        self.step();
                        return Ok(Some(point));
                    }
                    let name = key.0.clone();
                    self.current = Some(key);
                    self.series_name = name;
                    self.series_tags = tags;
                    self.cursor = self.first_bucket();
                    self.prev = None;
                }
                None => {
                    if self.current.is_some() && self.cursor_in_range() {
                        let point = self.synthesize(None);
                        self.step();
                        return Ok(Some(point));
                    }
                    return Ok(None);
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
        self.input.close();
    }
}

/// Wrap an aggregation with gap filling.
///
/// Returns the input unchanged when windowing is disabled, the mode is
/// `none`, or the queried range is unbounded (there is no bucket axis to
/// walk).
pub fn new_fill_iterator(input: AnyIterator, opt: &IteratorOptions) -> AnyIterator {
    if opt.interval.is_zero()
        || matches!(opt.fill, Fill::None)
        || !opt.time_range().is_bounded()
    {
        return input;
    }
    let mode = opt.fill;
    fn build<V: IteratorValue>(
        input: Box<dyn PointIterator<V>>,
        opt: &IteratorOptions,
        mode: Fill,
    ) -> AnyIterator {
        V::wrap_iterator(Box::new(FillIterator::new(input, opt, mode)))
    }
    match input {
        AnyIterator::Float(b) => build(b, opt, mode),
        AnyIterator::Integer(b) => build(b, opt, mode),
        AnyIterator::String(b) => build(b, opt, mode),
        AnyIterator::Boolean(b) => build(b, opt, mode),
    }
}
