//! Parsed-statement model consumed from the external SQL parser
//!
//! The engine does not parse query text; a parser collaborator delivers a
//! [`SelectStatement`] built from these nodes. The builder mirrors how the
//! storage engine's own query layer constructs plans programmatically.

use crate::point::DataType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a field or tag by name, with an optional type hint
/// (`value::float` style casts resolve into the hint).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    /// Field or tag name
    pub name: String,
    /// Declared type, `Unknown` when uncast
    pub data_type: DataType,
}

impl VarRef {
    /// An untyped reference
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Unknown,
        }
    }

    /// A reference with an explicit cast
    pub fn typed(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data_type {
            DataType::Unknown => write!(f, "{}", self.name),
            t => write!(f, "{}::{}", self.name, t),
        }
    }
}

/// Literal values appearing in expressions and conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Duration literal in nanoseconds
    Duration(i64),
    /// Absolute timestamp literal
    Timestamp(DateTime<Utc>),
}

impl Literal {
    /// The literal's value on the time axis, in nanoseconds, if it has one
    pub fn as_nanos(&self) -> Option<i64> {
        match self {
            Literal::Integer(v) => Some(*v),
            Literal::Duration(v) => Some(*v),
            Literal::Timestamp(t) => t.timestamp_nanos_opt(),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(v) => write!(f, "'{}'", v),
            Literal::Boolean(v) => write!(f, "{}", v),
            Literal::Duration(v) => write!(f, "{}ns", v),
            Literal::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339()),
        }
    }
}

/// Binary operators, arithmetic and logical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` — always produces a float
    Div,
    /// `%`
    Mod,
    /// `&` — bitwise on integers, logical on booleans
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `AND`, conditions only
    And,
    /// `OR`, conditions only
    Or,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
        };
        write!(f, "{}", s)
    }
}

/// An expression in a projection or condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Field or tag reference
    VarRef(VarRef),
    /// Function call
    Call {
        /// Function name, lowercase
        name: String,
        /// Arguments in order
        args: Vec<Expr>,
    },
    /// Literal value
    Literal(Literal),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// Parenthesized expression
    Paren(Box<Expr>),
}

impl Expr {
    /// Untyped field reference
    pub fn var(name: impl Into<String>) -> Self {
        Expr::VarRef(VarRef::new(name))
    }

    /// Typed field reference
    pub fn var_typed(name: impl Into<String>, data_type: DataType) -> Self {
        Expr::VarRef(VarRef::typed(name, data_type))
    }

    /// Function call
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// Integer literal
    pub fn int(v: i64) -> Self {
        Expr::Literal(Literal::Integer(v))
    }

    /// Float literal
    pub fn float(v: f64) -> Self {
        Expr::Literal(Literal::Float(v))
    }

    /// Boolean literal
    pub fn bool(v: bool) -> Self {
        Expr::Literal(Literal::Boolean(v))
    }

    /// Duration literal from seconds
    pub fn seconds(v: i64) -> Self {
        Expr::Literal(Literal::Duration(v * 1_000_000_000))
    }

    /// Binary operation
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Strip any number of wrapping parentheses
    pub fn unparenthesize(&self) -> &Expr {
        match self {
            Expr::Paren(inner) => inner.unparenthesize(),
            other => other,
        }
    }

    /// Collect every field reference in the expression, in first-appearance
    /// order without duplicates.
    pub fn var_refs(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        self.collect_var_refs(&mut out);
        out
    }

    fn collect_var_refs(&self, out: &mut Vec<VarRef>) {
        match self {
            Expr::VarRef(v) => {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Expr::Call { args, .. } => {
                for a in args {
                    a.collect_var_refs(out);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_var_refs(out);
                rhs.collect_var_refs(out);
            }
            Expr::Paren(inner) => inner.collect_var_refs(out),
            Expr::Literal(_) => {}
        }
    }

    /// True when the expression contains a function call anywhere
    pub fn has_call(&self) -> bool {
        match self {
            Expr::Call { .. } => true,
            Expr::Binary { lhs, rhs, .. } => lhs.has_call() || rhs.has_call(),
            Expr::Paren(inner) => inner.has_call(),
            _ => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::VarRef(v) => write!(f, "{}", v),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Expr::Literal(l) => write!(f, "{}", l),
            Expr::Binary { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Expr::Paren(inner) => write!(f, "({})", inner),
        }
    }
}

/// One projected column of a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The projected expression
    pub expr: Expr,
    /// Optional `AS` alias
    pub alias: Option<String>,
}

impl Field {
    /// Field without an alias
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    /// The output column name: the alias if present, the call or field name
    /// otherwise, and the rendered expression as a last resort.
    pub fn name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match self.expr.unparenthesize() {
            Expr::Call { name, .. } => name.clone(),
            Expr::VarRef(v) => v.name.clone(),
            other => other.to_string(),
        }
    }
}

/// A measurement source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name
    pub name: String,
}

impl Measurement {
    /// Source by name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A `GROUP BY` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// `time(every, offset)` windowing, both in nanoseconds
    Time {
        /// Window width
        every: i64,
        /// Window alignment offset
        offset: i64,
    },
    /// Grouping tag key
    Tag(String),
}

/// The `fill(...)` clause
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Fill {
    /// Omit empty buckets
    None,
    /// Emit nil points for empty buckets (the default for windowed queries)
    Null,
    /// Emit the given number for empty buckets
    Number(f64),
    /// Repeat the last seen value
    Previous,
    /// Interpolate between surrounding buckets
    Linear,
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Null
    }
}

/// A parsed `SELECT` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Projected fields in declaration order
    pub fields: Vec<Field>,
    /// Measurement sources
    pub sources: Vec<Measurement>,
    /// `WHERE` condition, including any time bounds
    pub condition: Option<Expr>,
    /// `GROUP BY` entries
    pub dimensions: Vec<Dimension>,
    /// Gap-filling policy
    pub fill: Fill,
    /// Time ordering; `false` for `ORDER BY time DESC`
    pub ascending: bool,
    /// Per-series row limit (0 = unlimited)
    pub limit: usize,
    /// Per-series row offset
    pub offset: usize,
    /// Series limit (0 = unlimited)
    pub slimit: usize,
    /// Series offset
    pub soffset: usize,
    /// Drop duplicate rows
    pub dedupe: bool,
}

impl SelectStatement {
    /// Start building a statement over the given measurement
    pub fn from(measurement: impl Into<String>) -> SelectBuilder {
        SelectBuilder {
            stmt: SelectStatement {
                fields: Vec::new(),
                sources: vec![Measurement::new(measurement)],
                condition: None,
                dimensions: Vec::new(),
                fill: Fill::Null,
                ascending: true,
                limit: 0,
                offset: 0,
                slimit: 0,
                soffset: 0,
                dedupe: false,
            },
        }
    }

    /// The windowing interval declared by `GROUP BY time(...)`, if any
    pub fn time_dimension(&self) -> Option<(i64, i64)> {
        self.dimensions.iter().find_map(|d| match d {
            Dimension::Time { every, offset } => Some((*every, *offset)),
            Dimension::Tag(_) => None,
        })
    }

    /// The grouping tag keys, in declaration order
    pub fn tag_dimensions(&self) -> Vec<String> {
        self.dimensions
            .iter()
            .filter_map(|d| match d {
                Dimension::Tag(name) => Some(name.clone()),
                Dimension::Time { .. } => None,
            })
            .collect()
    }
}

/// Builder for [`SelectStatement`]
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    stmt: SelectStatement,
}

impl SelectBuilder {
    /// Add a projected expression
    pub fn field(mut self, expr: Expr) -> Self {
        self.stmt.fields.push(Field::new(expr));
        self
    }

    /// Add a projected expression with an alias
    pub fn field_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.stmt.fields.push(Field {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// Add another measurement source
    pub fn source(mut self, measurement: impl Into<String>) -> Self {
        self.stmt.sources.push(Measurement::new(measurement));
        self
    }

    /// Set the condition
    pub fn condition(mut self, expr: Expr) -> Self {
        self.stmt.condition = Some(expr);
        self
    }

    /// Constrain time to `[start, end)` in nanoseconds
    pub fn time_range(mut self, start: i64, end: i64) -> Self {
        let time = |op, ns| {
            Expr::binary(
                op,
                Expr::var("time"),
                Expr::Literal(Literal::Duration(ns)),
            )
        };
        let bounds = Expr::binary(
            BinaryOp::And,
            time(BinaryOp::GtEq, start),
            time(BinaryOp::Lt, end),
        );
        self.stmt.condition = Some(match self.stmt.condition.take() {
            Some(existing) => Expr::binary(BinaryOp::And, bounds, existing),
            None => bounds,
        });
        self
    }

    /// Group into time windows of `every` nanoseconds
    pub fn group_by_time(mut self, every: i64) -> Self {
        self.stmt.dimensions.push(Dimension::Time { every, offset: 0 });
        self
    }

    /// Group into offset time windows
    pub fn group_by_time_offset(mut self, every: i64, offset: i64) -> Self {
        self.stmt.dimensions.push(Dimension::Time { every, offset });
        self
    }

    /// Group by a tag key
    pub fn group_by_tag(mut self, tag: impl Into<String>) -> Self {
        self.stmt.dimensions.push(Dimension::Tag(tag.into()));
        self
    }

    /// Set the fill policy
    pub fn fill(mut self, fill: Fill) -> Self {
        self.stmt.fill = fill;
        self
    }

    /// Reverse time ordering
    pub fn descending(mut self) -> Self {
        self.stmt.ascending = false;
        self
    }

    /// Per-series row paging
    pub fn limit_offset(mut self, limit: usize, offset: usize) -> Self {
        self.stmt.limit = limit;
        self.stmt.offset = offset;
        self
    }

    /// Series paging
    pub fn slimit_soffset(mut self, slimit: usize, soffset: usize) -> Self {
        self.stmt.slimit = slimit;
        self.stmt.soffset = soffset;
        self
    }

    /// Drop duplicate rows
    pub fn dedupe(mut self) -> Self {
        self.stmt.dedupe = true;
        self
    }

    /// Finish building
    pub fn build(self) -> SelectStatement {
        self.stmt
    }
}
