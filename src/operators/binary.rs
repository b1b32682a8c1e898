//! Binary expression evaluation over point streams
//!
//! Two evaluation shapes:
//!
//! - **Aux form** ([`new_binary_aux_iterator`]): the operands are fields of
//!   one raw source, threaded positionally through the aux cells. The
//!   iterator computes one output per source point — no join happens.
//! - **Join form** ([`new_binary_join_iterator`]): both operands are
//!   aggregations. The two co-ordered streams zip by `(name, tags, time)`;
//!   a key present on only one side evaluates with the missing side nil.
//!
//! Type rules: `+ - * %` stay integer only when both operands are integers;
//! `/` always produces a float; `& | ^` are bitwise on integer pairs and
//! logical on boolean pairs, anything mixed is rejected at construction.
//! If either operand is nil the result is nil. Integer division/modulo by
//! zero yields nil; float division by zero yields IEEE infinities or NaN
//! and is emitted as-is.

use crate::ast::BinaryOp;
use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, IteratorStats, PointIterator};
use crate::options::IteratorOptions;
use crate::point::{AnyPoint, CellValue, DataType, Point, Tags};
use std::cmp::Ordering;

/// One side of a binary expression in aux form.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// The point's primary value
    Value,
    /// Read the aux cell at this position
    Cell(usize),
    /// Float literal
    Float(f64),
    /// Integer literal
    Integer(i64),
    /// Boolean literal
    Boolean(bool),
    /// A nested sub-expression
    Nested(Box<NestedOperand>),
}

/// A nested sub-expression with its resolved output type.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedOperand {
    /// Operator
    pub op: BinaryOp,
    /// Left operand
    pub lhs: Operand,
    /// Right operand
    pub rhs: Operand,
    /// Resolved output type of this sub-expression
    pub out: DataType,
}

/// Evaluate an operand against one point, nil-propagating.
fn eval_operand(operand: &Operand, point: &AnyPoint) -> Option<CellValue> {
    match operand {
        Operand::Value => {
            let cell = point.value_cell();
            (!cell.is_nil()).then_some(cell)
        }
        Operand::Cell(i) => point
            .aux()
            .get(*i)
            .filter(|c| !c.is_nil())
            .cloned(),
        Operand::Float(v) => Some(CellValue::Float(*v)),
        Operand::Integer(v) => Some(CellValue::Integer(*v)),
        Operand::Boolean(v) => Some(CellValue::Boolean(*v)),
        Operand::Nested(n) => {
            let a = eval_operand(&n.lhs, point)?;
            let b = eval_operand(&n.rhs, point)?;
            combine_cells(n.op, n.out, &a, &b)
        }
    }
}

/// Apply an operator to two cells under the resolved output type.
fn combine_cells(op: BinaryOp, out: DataType, a: &CellValue, b: &CellValue) -> Option<CellValue> {
    match out {
        DataType::Float => match (a.as_float(), b.as_float()) {
            (Some(a), Some(b)) => Some(CellValue::Float(apply_float(op, a, b))),
            _ => None,
        },
        DataType::Integer => match (a.as_integer(), b.as_integer()) {
            (Some(a), Some(b)) => apply_integer(op, a, b).map(CellValue::Integer),
            _ => None,
        },
        DataType::Boolean => match (a.as_boolean(), b.as_boolean()) {
            (Some(a), Some(b)) => apply_boolean(op, a, b).map(CellValue::Boolean),
            _ => None,
        },
        _ => None,
    }
}

/// Resolve the output type of a binary expression from its operand types.
pub fn binary_expr_type(op: BinaryOp, lhs: DataType, rhs: DataType) -> Result<DataType> {
    use DataType::{Boolean, Float, Integer};
    let incompatible = || QueryError::IncompatibleTypes {
        lhs,
        op: op.to_string(),
        rhs,
    };
    let numeric = |t: DataType| t == Float || t == Integer;
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Mod => {
            if !numeric(lhs) || !numeric(rhs) {
                return Err(incompatible());
            }
            Ok(if lhs == Float || rhs == Float {
                Float
            } else {
                Integer
            })
        }
        BinaryOp::Div => {
            if !numeric(lhs) || !numeric(rhs) {
                return Err(incompatible());
            }
            Ok(Float)
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if lhs == Integer && rhs == Integer {
                Ok(Integer)
            } else if lhs == Boolean && rhs == Boolean {
                Ok(Boolean)
            } else {
                Err(incompatible())
            }
        }
        other => Err(QueryError::UnsupportedExpression(format!(
            "operator {} is not valid in a projection",
            other
        ))),
    }
}

fn float_operand(operand: &Operand, point: &AnyPoint) -> Option<f64> {
    eval_operand(operand, point).and_then(|c| c.as_float())
}

fn integer_operand(operand: &Operand, point: &AnyPoint) -> Option<i64> {
    eval_operand(operand, point).and_then(|c| c.as_integer())
}

fn boolean_operand(operand: &Operand, point: &AnyPoint) -> Option<bool> {
    eval_operand(operand, point).and_then(|c| c.as_boolean())
}

fn apply_float(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => f64::NAN,
    }
}

fn apply_integer(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div => (b != 0).then(|| a.wrapping_div(b)),
        BinaryOp::Mod => (b != 0).then(|| a.wrapping_rem(b)),
        BinaryOp::BitAnd => Some(a & b),
        BinaryOp::BitOr => Some(a | b),
        BinaryOp::BitXor => Some(a ^ b),
        _ => None,
    }
}

fn apply_boolean(op: BinaryOp, a: bool, b: bool) -> Option<bool> {
    match op {
        BinaryOp::BitAnd => Some(a && b),
        BinaryOp::BitOr => Some(a || b),
        BinaryOp::BitXor => Some(a ^ b),
        _ => None,
    }
}

/// The aux-form evaluator: one source, operands read per point.
struct BinaryAuxIterator {
    input: AnyIterator,
    op: BinaryOp,
    lhs: Operand,
    rhs: Operand,
    out: DataType,
    closed: bool,
}

impl BinaryAuxIterator {
    fn evaluate(&self, point: &AnyPoint) -> (i64, String, Tags, Option<CellValue>) {
        let time = point.time();
        let name = point.name().to_string();
        let tags = point.tags().clone();
        let value = match self.out {
            DataType::Float => {
                match (
                    float_operand(&self.lhs, point),
                    float_operand(&self.rhs, point),
                ) {
                    (Some(a), Some(b)) => Some(CellValue::Float(apply_float(self.op, a, b))),
                    _ => None,
                }
            }
            DataType::Integer => {
                match (
                    integer_operand(&self.lhs, point),
                    integer_operand(&self.rhs, point),
                ) {
                    (Some(a), Some(b)) => apply_integer(self.op, a, b).map(CellValue::Integer),
                    _ => None,
                }
            }
            DataType::Boolean => {
                match (
                    boolean_operand(&self.lhs, point),
                    boolean_operand(&self.rhs, point),
                ) {
                    (Some(a), Some(b)) => apply_boolean(self.op, a, b).map(CellValue::Boolean),
                    _ => None,
                }
            }
            _ => None,
        };
        (time, name, tags, value)
    }
}

macro_rules! binary_next {
    ($self:ident, $kind:ty, $extract:ident) => {{
        if $self.closed {
            return Ok(None);
        }
        match $self.input.next_any()? {
            Some(point) => {
                let (time, name, tags, value) = $self.evaluate(&point);
                let mut out = Point::<$kind>::null(name, time).with_tags(tags);
                if let Some(cell) = value {
                    if let Some(v) = cell.$extract() {
                        out.value = v.into();
                        out.nil = false;
                    }
                }
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }};
}

impl PointIterator<f64> for BinaryAuxIterator {
    fn next_point(&mut self) -> Result<Option<Point<f64>>> {
        binary_next!(self, f64, as_float)
    }

    fn stats(&self) -> IteratorStats {
        self.input.stats()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.input.close();
        }
    }
}

/// Wrapper so the one aux evaluator can implement three point kinds.
struct IntegerBinaryAux(BinaryAuxIterator);

impl PointIterator<i64> for IntegerBinaryAux {
    fn next_point(&mut self) -> Result<Option<Point<i64>>> {
        let this = &mut self.0;
        binary_next!(this, i64, as_integer)
    }

    fn stats(&self) -> IteratorStats {
        self.0.input.stats()
    }

    fn close(&mut self) {
        if !self.0.closed {
            self.0.closed = true;
            self.0.input.close();
        }
    }
}

struct BooleanBinaryAux(BinaryAuxIterator);

impl PointIterator<bool> for BooleanBinaryAux {
    fn next_point(&mut self) -> Result<Option<Point<bool>>> {
        let this = &mut self.0;
        binary_next!(this, bool, as_boolean)
    }

    fn stats(&self) -> IteratorStats {
        self.0.input.stats()
    }

    fn close(&mut self) {
        if !self.0.closed {
            self.0.closed = true;
            self.0.input.close();
        }
    }
}

/// Build the aux-form evaluator over one raw source.
pub fn new_binary_aux_iterator(
    input: AnyIterator,
    op: BinaryOp,
    lhs: Operand,
    rhs: Operand,
    out: DataType,
) -> Result<AnyIterator> {
    let inner = BinaryAuxIterator {
        input,
        op,
        lhs,
        rhs,
        out,
        closed: false,
    };
    match out {
        DataType::Float => Ok(AnyIterator::float(inner)),
        DataType::Integer => Ok(AnyIterator::integer(IntegerBinaryAux(inner))),
        DataType::Boolean => Ok(AnyIterator::boolean(BooleanBinaryAux(inner))),
        other => Err(QueryError::UnsupportedExpression(format!(
            "binary expression cannot produce {} points",
            other
        ))),
    }
}

// ============================================================================
// Join form
// ============================================================================

/// One side of the zip join, with single-point lookahead.
struct JoinSide {
    it: AnyIterator,
    head: Option<AnyPoint>,
}

impl JoinSide {
    fn peek(&mut self) -> Result<Option<&AnyPoint>> {
        if self.head.is_none() {
            self.head = self.it.next_any()?;
        }
        Ok(self.head.as_ref())
    }

    fn pop(&mut self) -> Option<AnyPoint> {
        self.head.take()
    }
}

struct BinaryJoinIterator {
    lhs: JoinSide,
    rhs: JoinSide,
    op: BinaryOp,
    out: DataType,
    dimensions: Vec<String>,
    ascending: bool,
    closed: bool,
}

impl BinaryJoinIterator {
    fn key(&self, p: &AnyPoint) -> (String, String, i64) {
        (
            p.name().to_string(),
            p.tags().subset(&self.dimensions).id(),
            p.time(),
        )
    }

    fn compare(&self, a: &(String, String, i64), b: &(String, String, i64)) -> Ordering {
        let ord = a.cmp(b);
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }

    /// Evaluate one output row from the available sides.
    fn row(&self, primary: &AnyPoint, other: Option<&AnyPoint>) -> (String, Tags, i64, Option<CellValue>) {
        let name = primary.name().to_string();
        let tags = primary.tags().clone();
        let time = primary.time();

        let a = primary.value_cell();
        let b = other.map(|p| p.value_cell()).unwrap_or(CellValue::Nil);
        let value = match self.out {
            DataType::Float => match (a.as_float(), b.as_float()) {
                (Some(a), Some(b)) => Some(CellValue::Float(apply_float(self.op, a, b))),
                _ => None,
            },
            DataType::Integer => match (a.as_integer(), b.as_integer()) {
                (Some(a), Some(b)) => apply_integer(self.op, a, b).map(CellValue::Integer),
                _ => None,
            },
            DataType::Boolean => match (a.as_boolean(), b.as_boolean()) {
                (Some(a), Some(b)) => apply_boolean(self.op, a, b).map(CellValue::Boolean),
                _ => None,
            },
            _ => None,
        };
        (name, tags, time, value)
    }

    fn next_row(&mut self) -> Result<Option<(String, Tags, i64, Option<CellValue>)>> {
        if self.closed {
            return Ok(None);
        }
        let left_peek = self.lhs.peek()?.cloned();
        let left_key = left_peek.as_ref().map(|p| self.key(p));
        let right_peek = self.rhs.peek()?.cloned();
        let right_key = right_peek.as_ref().map(|p| self.key(p));

        // A side missing a key evaluates with that side nil, so the output
        // row is nil either way; only the row metadata differs.
        let rhs_only = |this: &mut Self| {
            this.rhs.pop().map(|p| {
                let (name, tags, time, _) = this.row(&p, None);
                (name, tags, time, None)
            })
        };
        Ok(match (left_key, right_key) {
            (None, None) => None,
            (Some(_), None) => self.lhs.pop().map(|p| self.row(&p, None)),
            (None, Some(_)) => rhs_only(self),
            (Some(lk), Some(rk)) => match self.compare(&lk, &rk) {
                Ordering::Equal => match (self.lhs.pop(), self.rhs.pop()) {
                    (Some(l), Some(r)) => Some(self.row(&l, Some(&r))),
                    _ => None,
                },
                Ordering::Less => self.lhs.pop().map(|p| self.row(&p, None)),
                Ordering::Greater => rhs_only(self),
            },
        })
    }

    fn close_inner(&mut self) {
        if !self.closed {
            self.closed = true;
            self.lhs.it.close();
            self.rhs.it.close();
        }
    }
}

macro_rules! join_impl {
    ($wrapper:ident, $kind:ty, $extract:ident) => {
        struct $wrapper(BinaryJoinIterator);

        impl PointIterator<$kind> for $wrapper {
            fn next_point(&mut self) -> Result<Option<Point<$kind>>> {
                match self.0.next_row()? {
                    Some((name, tags, time, value)) => {
                        let mut out = Point::<$kind>::null(name, time).with_tags(tags);
                        if let Some(cell) = value {
                            if let Some(v) = cell.$extract() {
                                out.value = v.into();
                                out.nil = false;
                            }
                        }
                        Ok(Some(out))
                    }
                    None => Ok(None),
                }
            }

            fn stats(&self) -> IteratorStats {
                let mut stats = self.0.lhs.it.stats();
                stats.add(&self.0.rhs.it.stats());
                stats
            }

            fn close(&mut self) {
                self.0.close_inner();
            }
        }
    };
}

join_impl!(FloatBinaryJoin, f64, as_float);
join_impl!(IntegerBinaryJoin, i64, as_integer);
join_impl!(BooleanBinaryJoin, bool, as_boolean);

/// Build the join-form evaluator over two co-ordered aggregate streams.
pub fn new_binary_join_iterator(
    lhs: AnyIterator,
    rhs: AnyIterator,
    op: BinaryOp,
    opt: &IteratorOptions,
    out: DataType,
) -> Result<AnyIterator> {
    let inner = BinaryJoinIterator {
        lhs: JoinSide { it: lhs, head: None },
        rhs: JoinSide { it: rhs, head: None },
        op,
        out,
        dimensions: opt.dimensions.clone(),
        ascending: opt.ascending,
        closed: false,
    };
    match out {
        DataType::Float => Ok(AnyIterator::float(FloatBinaryJoin(inner))),
        DataType::Integer => Ok(AnyIterator::integer(IntegerBinaryJoin(inner))),
        DataType::Boolean => Ok(AnyIterator::boolean(BooleanBinaryJoin(inner))),
        other => Err(QueryError::UnsupportedExpression(format!(
            "binary expression cannot produce {} points",
            other
        ))),
    }
}
