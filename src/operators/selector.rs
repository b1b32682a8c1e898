//! `top` / `bottom` selector iterators
//!
//! Selectors pick the N extreme points of each window, preserving original
//! timestamps and carried aux cells. With tag arguments the planner feeds
//! them a per-tag aggregate stream (`top` → `max`, `bottom` → `min`) whose
//! aux cells hold the tag values; the selection here then ranks those
//! aggregates across the whole window.

use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, IteratorValue, PointIterator};
use crate::operators::call::{EmitPoint, Reducer, WindowedReduceIterator};
use crate::options::IteratorOptions;
use crate::point::{CellValue, Point, PointValue};

struct SelectorReducer<V: PointValue> {
    buffer: Vec<(i64, V, Vec<CellValue>)>,
    n: usize,
    is_top: bool,
}

impl<V: PointValue> Reducer<V, V> for SelectorReducer<V> {
    fn aggregate(&mut self, point: &Point<V>) {
        self.buffer
            .push((point.time, point.value.clone(), point.aux.clone()));
    }

    fn emit(&mut self, _window_start: i64) -> Vec<EmitPoint<V>> {
        let mut buffer = std::mem::take(&mut self.buffer);
        let is_top = self.is_top;

        // Rank by value; ties during selection prefer the earlier point.
        buffer.sort_by(|a, b| {
            let ord = a.1.cmp_values(&b.1);
            let ord = if is_top { ord.reverse() } else { ord };
            ord.then_with(|| a.0.cmp(&b.0))
        });
        buffer.truncate(self.n);

        // Output inside a window orders by time; equal times order by value,
        // descending for top and ascending for bottom.
        buffer.sort_by(|a, b| {
            a.0.cmp(&b.0).then_with(|| {
                let ord = a.1.cmp_values(&b.1);
                if is_top {
                    ord.reverse()
                } else {
                    ord
                }
            })
        });

        buffer
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

fn build<V: IteratorValue>(
    input: Box<dyn PointIterator<V>>,
    opt: &IteratorOptions,
    n: usize,
    is_top: bool,
) -> AnyIterator {
    V::wrap_iterator(Box::new(WindowedReduceIterator::new(input, opt, move || {
        SelectorReducer {
            buffer: Vec::new(),
            n,
            is_top,
        }
    })))
}

/// Build a `top(value, N)` iterator; numeric inputs only
pub fn new_top_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    n: usize,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(build(b, opt, n, true)),
        AnyIterator::Integer(b) => Ok(build(b, opt, n, true)),
        _ => Err(QueryError::unsupported_call("top", kind)),
    }
}

/// Build a `bottom(value, N)` iterator; numeric inputs only
pub fn new_bottom_iterator(
    input: AnyIterator,
    opt: &IteratorOptions,
    n: usize,
) -> Result<AnyIterator> {
    let kind = input.data_type();
    match input {
        AnyIterator::Float(b) => Ok(build(b, opt, n, false)),
        AnyIterator::Integer(b) => Ok(build(b, opt, n, false)),
        _ => Err(QueryError::unsupported_call("bottom", kind)),
    }
}
