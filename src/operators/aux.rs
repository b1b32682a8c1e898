//! Aux fan-out: one source stream, many projected outputs
//!
//! Raw selects compile to a single shard iterator whose aux cells carry
//! every referenced field. The fan-out owns that source behind a mutex and
//! hands out one typed output iterator per projection: either the source
//! points themselves (`Primary`) or a single aux position lowered to a
//! typed stream (`Cell`). Outputs may be consumed in any interleaving; the
//! shared state buffers whatever the slower consumers have not read yet.
//!
//! The source closes when the last output closes.

use crate::error::Result;
use crate::iterator::{AnyIterator, IteratorStats, PointIterator};
use crate::point::{AnyPoint, DataType, Point, PointValue};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

/// What an output projects out of the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxTarget {
    /// The source points, unchanged (value and aux cells included)
    Primary,
    /// The aux cell at this position, as a typed point stream
    Cell(usize),
}

struct Shared {
    input: AnyIterator,
    buffers: Vec<VecDeque<AnyPoint>>,
    open: Vec<bool>,
    done: bool,
}

impl Shared {
    /// Pull one source point and distribute it to every open output.
    fn pump(&mut self) -> Result<()> {
        match self.input.next_any()? {
            Some(point) => {
                for (buffer, open) in self.buffers.iter_mut().zip(&self.open) {
                    if *open {
                        buffer.push_back(point.clone());
                    }
                }
            }
            None => self.done = true,
        }
        Ok(())
    }
}

/// Builder handing out projected outputs over one source.
pub struct AuxFanout {
    shared: Arc<Mutex<Shared>>,
}

impl AuxFanout {
    /// Take ownership of the source stream
    pub fn new(input: AnyIterator) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                input,
                buffers: Vec::new(),
                open: Vec::new(),
                done: false,
            })),
        }
    }

    /// Register an output reading `target`, typed as `kind`.
    ///
    /// `Tag` fields surface as strings; unresolved fields default to float.
    pub fn output(&mut self, target: AuxTarget, kind: DataType) -> AnyIterator {
        let index = {
            let mut shared = self.shared.lock();
            shared.buffers.push(VecDeque::new());
            shared.open.push(true);
            shared.buffers.len() - 1
        };
        match kind {
            DataType::Integer => AnyIterator::integer(AuxStream::<i64> {
                shared: Arc::clone(&self.shared),
                index,
                target,
                closed: false,
                _marker: PhantomData,
            }),
            DataType::String | DataType::Tag => AnyIterator::string(AuxStream::<String> {
                shared: Arc::clone(&self.shared),
                index,
                target,
                closed: false,
                _marker: PhantomData,
            }),
            DataType::Boolean => AnyIterator::boolean(AuxStream::<bool> {
                shared: Arc::clone(&self.shared),
                index,
                target,
                closed: false,
                _marker: PhantomData,
            }),
            _ => AnyIterator::float(AuxStream::<f64> {
                shared: Arc::clone(&self.shared),
                index,
                target,
                closed: false,
                _marker: PhantomData,
            }),
        }
    }
}

/// One typed output of the fan-out.
struct AuxStream<V: PointValue> {
    shared: Arc<Mutex<Shared>>,
    index: usize,
    target: AuxTarget,
    closed: bool,
    _marker: PhantomData<V>,
}

impl<V: PointValue> AuxStream<V> {
    fn convert(&self, point: AnyPoint) -> Point<V> {
        match self.target {
            AuxTarget::Primary => {
                let name = point.name().to_string();
                let time = point.time();
                let tags = point.tags().clone();
                V::unwrap_point(point)
                    .unwrap_or_else(|| Point::<V>::null(name, time).with_tags(tags))
            }
            AuxTarget::Cell(i) => {
                let mut out = Point::<V>::null(point.name().to_string(), point.time())
                    .with_tags(point.tags().clone());
                if let Some(v) = point.aux().get(i).and_then(V::from_cell) {
                    out.value = v;
                    out.nil = false;
                }
                out
            }
        }
    }
}

impl<V: PointValue> PointIterator<V> for AuxStream<V> {
    fn next_point(&mut self) -> Result<Option<Point<V>>> {
        if self.closed {
            return Ok(None);
        }
        let shared = Arc::clone(&self.shared);
        let mut shared = shared.lock();
        loop {
            if let Some(p) = shared.buffers[self.index].pop_front() {
                return Ok(Some(self.convert(p)));
            }
            if shared.done {
                return Ok(None);
            }
            shared.pump()?;
        }
    }

    fn stats(&self) -> IteratorStats {
        self.shared.lock().input.stats()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut shared = self.shared.lock();
        shared.open[self.index] = false;
        shared.buffers[self.index].clear();
        if shared.open.iter().all(|open| !open) {
            shared.input.close();
        }
    }
}
