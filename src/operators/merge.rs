//! K-way merge of per-shard streams into a single ordered stream
//!
//! Two merge shapes exist:
//!
//! - [`sorted_merge_iterator`] interleaves raw streams point-by-point in
//!   `(name, tags, time)` order — `tags` being the subset selected by
//!   `options.dimensions`, so series that collapse into one output group
//!   interleave correctly.
//! - [`merge_iterator`] interleaves call streams run-by-run in
//!   `(name, tags, window)` order: once an upstream starts a
//!   `(name, tags, window)` run it keeps the floor until the run ends,
//!   keeping per-window partial aggregates contiguous for the combine stage.
//!
//! Both merges are stable: equal keys resolve in upstream declaration order.

use crate::error::Result;
use crate::iterator::{
    AnyIterator, Buffered, IteratorStats, IteratorValue, PointIterator,
};
use crate::options::IteratorOptions;
use crate::point::{Point, PointValue};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Merge key of a buffered upstream's head point.
struct HeapItem<V: PointValue> {
    itr: Buffered<V>,
    name: String,
    tags_id: String,
    /// Window start for the run merge, point time for the sorted merge
    order_time: i64,
    idx: usize,
    ascending: bool,
}

impl<V: PointValue> HeapItem<V> {
    /// Total order: smaller keys pop first; ties resolve to the earlier
    /// upstream index for stability.
    fn key_cmp(&self, other: &Self) -> Ordering {
        let ord = self
            .name
            .cmp(&other.name)
            .then_with(|| self.tags_id.cmp(&other.tags_id))
            .then_with(|| self.order_time.cmp(&other.order_time));
        let ord = if self.ascending { ord } else { ord.reverse() };
        ord.then_with(|| self.idx.cmp(&other.idx))
    }
}

impl<V: PointValue> PartialEq for HeapItem<V> {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl<V: PointValue> Eq for HeapItem<V> {}

impl<V: PointValue> PartialOrd for HeapItem<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V: PointValue> Ord for HeapItem<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key pops first.
        self.key_cmp(other).reverse()
    }
}

enum MergeMode {
    /// Pop one point at a time in exact time order
    Sorted,
    /// Keep the floor for a whole (name, tags, window) run
    WindowRuns,
}

/// The k-way merge over same-kind upstreams.
struct Merge<V: PointValue> {
    heap: BinaryHeap<HeapItem<V>>,
    pending: Vec<(usize, Buffered<V>)>,
    current: Option<HeapItem<V>>,
    run_key: (String, String, i64),
    mode: MergeMode,
    opt: IteratorOptions,
    closed_stats: IteratorStats,
    closed: bool,
}

impl<V: PointValue> Merge<V> {
    fn new(inputs: Vec<Box<dyn PointIterator<V>>>, opt: &IteratorOptions, mode: MergeMode) -> Self {
        let pending = inputs
            .into_iter()
            .map(Buffered::new)
            .enumerate()
            .collect();
        Self {
            heap: BinaryHeap::new(),
            pending,
            current: None,
            run_key: (String::new(), String::new(), 0),
            mode,
            opt: opt.clone(),
            closed_stats: IteratorStats::default(),
            closed: false,
        }
    }

    fn point_key(&self, p: &Point<V>) -> (String, String, i64) {
        let tags_id = p.tags.subset(&self.opt.dimensions).id();
        let order_time = match self.mode {
            MergeMode::Sorted => p.time,
            MergeMode::WindowRuns => self.opt.window(p.time).0,
        };
        (p.name.clone(), tags_id, order_time)
    }

    /// Peek an upstream's head key, closing it at end-of-stream.
    fn head_key(
        &mut self,
        itr: &mut Buffered<V>,
    ) -> Result<Option<(String, String, i64)>> {
        let key = match itr.peek() {
            Ok(Some(p)) => Some(self.point_key(p)),
            Ok(None) => None,
            Err(e) => {
                self.closed_stats.add(&itr.stats());
                itr.close();
                return Err(e);
            }
        };
        if key.is_none() {
            self.closed_stats.add(&itr.stats());
            itr.close();
        }
        Ok(key)
    }

    /// Move every pending upstream with a head point into the heap.
    fn prime(&mut self) -> Result<()> {
        while let Some((idx, mut itr)) = self.pending.pop() {
            if let Some((name, tags_id, order_time)) = self.head_key(&mut itr)? {
                self.heap.push(HeapItem {
                    itr,
                    name,
                    tags_id,
                    order_time,
                    idx,
                    ascending: self.opt.ascending,
                });
            }
        }
        Ok(())
    }

    /// Re-key an item against its new head, or retire it at end-of-stream.
    fn requeue(&mut self, mut item: HeapItem<V>) -> Result<()> {
        if let Some((name, tags_id, order_time)) = self.head_key(&mut item.itr)? {
            item.name = name;
            item.tags_id = tags_id;
            item.order_time = order_time;
            self.heap.push(item);
        }
        Ok(())
    }
}

impl<V: PointValue> PointIterator<V> for Merge<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if self.closed {
            return Ok(None);
        }
        self.prime()?;

        loop {
            // Continue the active run while its key holds.
            if let Some(mut item) = self.current.take() {
                let continues = match item.itr.peek()? {
                    Some(p) => self.point_key(p) == self.run_key,
                    None => false,
                };
                if continues {
                    let p = item.itr.next_point()?;
                    self.current = Some(item);
                    return Ok(p);
                }
                self.requeue(item)?;
            }

            let mut item = match self.heap.pop() {
                Some(item) => item,
                None => return Ok(None),
            };
            let point = match item.itr.next_point()? {
                Some(p) => p,
                None => {
                    self.closed_stats.add(&item.itr.stats());
                    item.itr.close();
                    continue;
                }
            };
            match self.mode {
                MergeMode::Sorted => {
                    self.requeue(item)?;
                    return Ok(Some(point));
                }
                MergeMode::WindowRuns => {
                    self.run_key = self.point_key(&point);
                    self.current = Some(item);
                    return Ok(Some(point));
                }
            }
        }
    }

    fn stats(&self) -> IteratorStats {
        let mut stats = self.closed_stats;
        for item in self.heap.iter() {
            stats.add(&item.itr.stats());
        }
        if let Some(item) = &self.current {
            stats.add(&item.itr.stats());
        }
        for (_, itr) in &self.pending {
            stats.add(&itr.stats());
        }
        stats
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for mut item in std::mem::take(&mut self.heap).into_vec() {
            self.closed_stats.add(&item.itr.stats());
            item.itr.close();
        }
        if let Some(mut item) = self.current.take() {
            self.closed_stats.add(&item.itr.stats());
            item.itr.close();
        }
        for (_, mut itr) in std::mem::take(&mut self.pending) {
            self.closed_stats.add(&itr.stats());
            itr.close();
        }
    }
}

fn downcast_all<V: IteratorValue>(inputs: Vec<AnyIterator>) -> Vec<Box<dyn PointIterator<V>>> {
    // The caller has already verified all inputs share one kind.
    inputs
        .into_iter()
        .filter_map(V::unwrap_iterator)
        .collect()
}

fn build<V: IteratorValue>(
    inputs: Vec<AnyIterator>,
    opt: &IteratorOptions,
    mode: MergeMode,
) -> AnyIterator {
    V::wrap_iterator(Box::new(Merge::new(downcast_all::<V>(inputs), opt, mode)))
}

/// Window-run merge over same-kind call streams.
pub fn merge_iterator(inputs: Vec<AnyIterator>, opt: &IteratorOptions) -> Result<AnyIterator> {
    Ok(dispatch(inputs, opt, MergeMode::WindowRuns))
}

/// Exact point-order merge over same-kind raw streams.
pub fn sorted_merge_iterator(
    inputs: Vec<AnyIterator>,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    Ok(dispatch(inputs, opt, MergeMode::Sorted))
}

fn dispatch(inputs: Vec<AnyIterator>, opt: &IteratorOptions, mode: MergeMode) -> AnyIterator {
    match inputs.first().map(|it| it.data_type()) {
        Some(crate::point::DataType::Integer) => build::<i64>(inputs, opt, mode),
        Some(crate::point::DataType::String) => build::<String>(inputs, opt, mode),
        Some(crate::point::DataType::Boolean) => build::<bool>(inputs, opt, mode),
        _ => build::<f64>(inputs, opt, mode),
    }
}
