//! Stream modifiers: sorting, interval snapping, paging, dedupe
//!
//! Small wrappers the planner stacks around a finished pipeline:
//!
//! - [`new_sort_iterator`] adapts an unsorted raw source into the declared
//!   stream order; shards that cannot guarantee order wrap their iterators
//!   with it before handing them to a merge.
//! - [`new_interval_iterator`] snaps aggregate point times to their window
//!   start (time 0 when windowing is disabled); selectors that keep
//!   original timestamps skip this wrapper.
//! - [`new_limit_iterator`] applies `LIMIT`/`OFFSET` per series.
//! - [`new_slimit_iterator`] applies `SLIMIT`/`SOFFSET` across series.
//! - [`new_dedupe_iterator`] drops rows identical to one already emitted.

use crate::error::Result;
use crate::iterator::{AnyIterator, IteratorStats, IteratorValue, PointIterator};
use crate::options::IteratorOptions;
use crate::point::{Point, PointValue};
use std::collections::HashSet;

/// Buffers the whole upstream and re-emits it in `(name, tags, time)`
/// order, honoring the query direction.
///
/// Sorting needs the entire input in memory; a source that is already
/// ordered should be handed to the merges directly instead.
struct SortIterator<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    opt: IteratorOptions,
    sorted: Option<std::vec::IntoIter<Point<V>>>,
    closed: bool,
}

impl<V: PointValue> SortIterator<V> {
    fn collect_sorted(&mut self) -> Result<std::vec::IntoIter<Point<V>>> {
        let mut points = Vec::new();
        while let Some(p) = self.input.next_point()? {
            points.push(p);
        }
        let dims = self.opt.dimensions.clone();
        let ascending = self.opt.ascending;
        points.sort_by(|a, b| {
            let ord = a
                .name
                .cmp(&b.name)
                .then_with(|| a.tags.subset(&dims).id().cmp(&b.tags.subset(&dims).id()))
                .then_with(|| a.time.cmp(&b.time));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        Ok(points.into_iter())
    }
}

impl<V: PointValue> PointIterator<V> for SortIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if self.closed {
            return Ok(None);
        }
        if self.sorted.is_none() {
            self.sorted = Some(self.collect_sorted()?);
        }
        Ok(self.sorted.as_mut().and_then(|it| it.next()))
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sorted = None;
        self.input.close();
    }
}

/// Adapt an unsorted source into the declared stream order.
pub fn new_sort_iterator(input: AnyIterator, opt: &IteratorOptions) -> AnyIterator {
    fn build<V: IteratorValue>(
        input: Box<dyn PointIterator<V>>,
        opt: &IteratorOptions,
    ) -> AnyIterator {
        V::wrap_iterator(Box::new(SortIterator {
            input,
            opt: opt.clone(),
            sorted: None,
            closed: false,
        }))
    }
    match input {
        AnyIterator::Float(b) => build(b, opt),
        AnyIterator::Integer(b) => build(b, opt),
        AnyIterator::String(b) => build(b, opt),
        AnyIterator::Boolean(b) => build(b, opt),
    }
}

/// Snap point times to the window start declared by the options.
struct IntervalIterator<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    opt: IteratorOptions,
}

impl<V: PointValue> PointIterator<V> for IntervalIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        Ok(self.input.next_point()?.map(|mut p| {
            p.time = self.opt.window_start(p.time);
            p
        }))
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Wrap an aggregate so its points emit at window starts.
pub fn new_interval_iterator(input: AnyIterator, opt: &IteratorOptions) -> AnyIterator {
    fn build<V: IteratorValue>(
        input: Box<dyn PointIterator<V>>,
        opt: &IteratorOptions,
    ) -> AnyIterator {
        V::wrap_iterator(Box::new(IntervalIterator {
            input,
            opt: opt.clone(),
        }))
    }
    match input {
        AnyIterator::Float(b) => build(b, opt),
        AnyIterator::Integer(b) => build(b, opt),
        AnyIterator::String(b) => build(b, opt),
        AnyIterator::Boolean(b) => build(b, opt),
    }
}

/// `LIMIT n OFFSET m`, applied within each series independently.
struct LimitIterator<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    limit: usize,
    offset: usize,
    current: Option<(String, String)>,
    seen: usize,
}

impl<V: PointValue> PointIterator<V> for LimitIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        loop {
            let Some(p) = self.input.next_point()? else {
                return Ok(None);
            };
            let key = (p.name.clone(), p.tags.id());
            if self.current.as_ref() != Some(&key) {
                self.current = Some(key);
                self.seen = 0;
            }
            self.seen += 1;
            if self.seen <= self.offset {
                continue;
            }
            if self.limit > 0 && self.seen > self.offset + self.limit {
                continue;
            }
            return Ok(Some(p));
        }
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Apply per-series row paging.
pub fn new_limit_iterator(input: AnyIterator, limit: usize, offset: usize) -> AnyIterator {
    fn build<V: IteratorValue>(
        input: Box<dyn PointIterator<V>>,
        limit: usize,
        offset: usize,
    ) -> AnyIterator {
        V::wrap_iterator(Box::new(LimitIterator {
            input,
            limit,
            offset,
            current: None,
            seen: 0,
        }))
    }
    match input {
        AnyIterator::Float(b) => build(b, limit, offset),
        AnyIterator::Integer(b) => build(b, limit, offset),
        AnyIterator::String(b) => build(b, limit, offset),
        AnyIterator::Boolean(b) => build(b, limit, offset),
    }
}

/// `SLIMIT n SOFFSET m`, applied to distinct series in stream order.
struct SLimitIterator<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    slimit: usize,
    soffset: usize,
    current: Option<(String, String)>,
    series_index: usize,
}

impl<V: PointValue> PointIterator<V> for SLimitIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        loop {
            let Some(p) = self.input.next_point()? else {
                return Ok(None);
            };
            let key = (p.name.clone(), p.tags.id());
            if self.current.as_ref() != Some(&key) {
                self.current = Some(key);
                self.series_index += 1;
            }
            let index = self.series_index;
            if index <= self.soffset {
                continue;
            }
            if self.slimit > 0 && index > self.soffset + self.slimit {
                // every later series is past the limit too
                self.close();
                return Ok(None);
            }
            return Ok(Some(p));
        }
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Apply series paging.
pub fn new_slimit_iterator(input: AnyIterator, slimit: usize, soffset: usize) -> AnyIterator {
    fn build<V: IteratorValue>(
        input: Box<dyn PointIterator<V>>,
        slimit: usize,
        soffset: usize,
    ) -> AnyIterator {
        V::wrap_iterator(Box::new(SLimitIterator {
            input,
            slimit,
            soffset,
            current: None,
            series_index: 0,
        }))
    }
    match input {
        AnyIterator::Float(b) => build(b, slimit, soffset),
        AnyIterator::Integer(b) => build(b, slimit, soffset),
        AnyIterator::String(b) => build(b, slimit, soffset),
        AnyIterator::Boolean(b) => build(b, slimit, soffset),
    }
}

/// Drop rows identical to one already emitted.
struct DedupeIterator<V: PointValue> {
    input: Box<dyn PointIterator<V>>,
    seen: HashSet<String>,
}

impl<V: PointValue> PointIterator<V> for DedupeIterator<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        loop {
            let Some(p) = self.input.next_point()? else {
                return Ok(None);
            };
            let key = format!(
                "{}|{}|{}|{:?}|{}|{:?}",
                p.name,
                p.tags.id(),
                p.time,
                p.value,
                p.nil,
                p.aux
            );
            if self.seen.insert(key) {
                return Ok(Some(p));
            }
        }
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Wrap a stream so duplicate rows are dropped.
pub fn new_dedupe_iterator(input: AnyIterator) -> AnyIterator {
    fn build<V: IteratorValue>(input: Box<dyn PointIterator<V>>) -> AnyIterator {
        V::wrap_iterator(Box::new(DedupeIterator {
            input,
            seen: HashSet::new(),
        }))
    }
    match input {
        AnyIterator::Float(b) => build(b),
        AnyIterator::Integer(b) => build(b),
        AnyIterator::String(b) => build(b),
        AnyIterator::Boolean(b) => build(b),
    }
}
