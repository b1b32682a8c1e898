//! Typed point model shared by every iterator in the engine
//!
//! A point is a single timestamped observation of one measurement: a value
//! of one of four scalar kinds, an ordered tag set, and an optional row of
//! auxiliary cells used to carry additional fields alongside the primary
//! value. Iterators are monomorphized over the value type; the
//! [`AnyPoint`] and [`DataType`] forms exist for the type-erased seams.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar kind of a point stream or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// IEEE-754 binary64
    Float,
    /// Signed 64-bit integer
    Integer,
    /// UTF-8 string
    String,
    /// Boolean
    Boolean,
    /// A tag key (dimension), not a field
    Tag,
    /// Unresolved
    Unknown,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Float => "float",
            DataType::Integer => "integer",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Tag => "tag",
            DataType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A dynamically-typed auxiliary cell.
///
/// Raw sources populate one cell per entry of `IteratorOptions::aux`;
/// consumers read them positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Float cell
    Float(f64),
    /// Integer cell
    Integer(i64),
    /// String cell
    String(String),
    /// Boolean cell
    Boolean(bool),
    /// Absent value
    Nil,
}

impl CellValue {
    /// Read the cell as a float, up-converting integers
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Read the cell as an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Read the cell as a boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Read the cell as a string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            CellValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// True when the cell carries no value
    pub fn is_nil(&self) -> bool {
        matches!(self, CellValue::Nil)
    }
}

/// Ordered tag set for a series.
///
/// Keys sort ascending; identity and ordering use the concatenated
/// `key=value` sequence so two tag sets compare the same way regardless of
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Create an empty tag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `k=v,k=v` string into a tag set.
    ///
    /// Malformed entries without `=` are ignored.
    pub fn parse(s: &str) -> Self {
        let mut tags = BTreeMap::new();
        for pair in s.split(',') {
            if let Some((k, v)) = pair.split_once('=') {
                tags.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        Self(tags)
    }

    /// Insert a tag
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a tag value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no tags are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical identity string: `k=v` pairs joined by commas, keys ascending.
    ///
    /// Precomputed by ordering-sensitive consumers (the merge heap) so point
    /// comparisons stay cheap.
    pub fn id(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }

    /// The subset of this tag set restricted to the given keys.
    ///
    /// Keys absent from the set are simply not present in the subset.
    pub fn subset(&self, keys: &[String]) -> Tags {
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(v) = self.0.get(key) {
                out.insert(key.clone(), v.clone());
            }
        }
        Tags(out)
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Behavior required of a point's scalar value type.
///
/// Implemented exactly four times; iterators are generic over this trait so
/// the hot paths monomorphize instead of dispatching on a runtime tag.
pub trait PointValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The runtime kind of this value type
    const KIND: DataType;

    /// A throwaway value for nil points
    fn zero() -> Self;

    /// Total ordering between two values of this type
    fn cmp_values(&self, other: &Self) -> Ordering;

    /// Convert into a dynamically-typed cell
    fn into_cell(self) -> CellValue;

    /// Read this type out of a cell, if compatible
    fn from_cell(cell: &CellValue) -> Option<Self>;

    /// Lift a typed point into the type-erased form
    fn wrap_point(point: Point<Self>) -> AnyPoint;

    /// Lower a type-erased point, if it carries this type
    fn unwrap_point(point: AnyPoint) -> Option<Point<Self>>;

    /// Linear interpolation between two values at `frac` in `[0, 1]`.
    ///
    /// Returns `None` for value types that cannot interpolate; integer
    /// results truncate toward zero.
    fn interpolate(_a: &Self, _b: &Self, _frac: f64) -> Option<Self> {
        None
    }
}

/// Numeric point value types (float and integer)
pub trait NumericValue: PointValue {
    /// Widen to a float
    fn to_f64(&self) -> f64;
    /// Narrow from a float, truncating toward zero for integers
    fn from_f64(v: f64) -> Self;
    /// Additive identity
    fn add(&self, other: &Self) -> Self;
    /// Subtraction, used by `difference` and `spread`
    fn sub(&self, other: &Self) -> Self;
}

impl PointValue for f64 {
    const KIND: DataType = DataType::Float;

    fn zero() -> Self {
        0.0
    }

    fn cmp_values(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn into_cell(self) -> CellValue {
        CellValue::Float(self)
    }

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_float()
    }

    fn wrap_point(point: Point<Self>) -> AnyPoint {
        AnyPoint::Float(point)
    }

    fn unwrap_point(point: AnyPoint) -> Option<Point<Self>> {
        match point {
            AnyPoint::Float(p) => Some(p),
            _ => None,
        }
    }

    fn interpolate(a: &Self, b: &Self, frac: f64) -> Option<Self> {
        Some(a + (b - a) * frac)
    }
}

impl NumericValue for f64 {
    fn to_f64(&self) -> f64 {
        *self
    }

    fn from_f64(v: f64) -> Self {
        v
    }

    fn add(&self, other: &Self) -> Self {
        self + other
    }

    fn sub(&self, other: &Self) -> Self {
        self - other
    }
}

impl PointValue for i64 {
    const KIND: DataType = DataType::Integer;

    fn zero() -> Self {
        0
    }

    fn cmp_values(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_cell(self) -> CellValue {
        CellValue::Integer(self)
    }

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_integer()
    }

    fn wrap_point(point: Point<Self>) -> AnyPoint {
        AnyPoint::Integer(point)
    }

    fn unwrap_point(point: AnyPoint) -> Option<Point<Self>> {
        match point {
            AnyPoint::Integer(p) => Some(p),
            _ => None,
        }
    }

    fn interpolate(a: &Self, b: &Self, frac: f64) -> Option<Self> {
        Some((*a as f64 + (*b as f64 - *a as f64) * frac) as i64)
    }
}

impl NumericValue for i64 {
    fn to_f64(&self) -> f64 {
        *self as f64
    }

    fn from_f64(v: f64) -> Self {
        v as i64
    }

    fn add(&self, other: &Self) -> Self {
        self.wrapping_add(*other)
    }

    fn sub(&self, other: &Self) -> Self {
        self.wrapping_sub(*other)
    }
}

impl PointValue for String {
    const KIND: DataType = DataType::String;

    fn zero() -> Self {
        String::new()
    }

    fn cmp_values(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_cell(self) -> CellValue {
        CellValue::String(self)
    }

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_string().map(|s| s.to_string())
    }

    fn wrap_point(point: Point<Self>) -> AnyPoint {
        AnyPoint::String(point)
    }

    fn unwrap_point(point: AnyPoint) -> Option<Point<Self>> {
        match point {
            AnyPoint::String(p) => Some(p),
            _ => None,
        }
    }
}

impl PointValue for bool {
    const KIND: DataType = DataType::Boolean;

    fn zero() -> Self {
        false
    }

    fn cmp_values(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn into_cell(self) -> CellValue {
        CellValue::Boolean(self)
    }

    fn from_cell(cell: &CellValue) -> Option<Self> {
        cell.as_boolean()
    }

    fn wrap_point(point: Point<Self>) -> AnyPoint {
        AnyPoint::Boolean(point)
    }

    fn unwrap_point(point: AnyPoint) -> Option<Point<Self>> {
        match point {
            AnyPoint::Boolean(p) => Some(p),
            _ => None,
        }
    }
}

/// A single typed point in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point<V> {
    /// Measurement name
    pub name: String,
    /// Tag set, canonicalized by key
    pub tags: Tags,
    /// Unix nanoseconds since epoch
    pub time: i64,
    /// Primary value; meaningless when `nil` is set
    pub value: V,
    /// Absent-value marker
    pub nil: bool,
    /// Auxiliary cells carried alongside the primary value
    pub aux: Vec<CellValue>,
    /// How many raw points contributed to this one (0 = raw)
    pub aggregated: u32,
}

impl<V: PointValue> Point<V> {
    /// Create a raw point with no tags or aux cells
    pub fn new(name: impl Into<String>, time: i64, value: V) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            time,
            value,
            nil: false,
            aux: Vec::new(),
            aggregated: 0,
        }
    }

    /// Create a nil point at the given time
    pub fn null(name: impl Into<String>, time: i64) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            time,
            value: V::zero(),
            nil: true,
            aux: Vec::new(),
            aggregated: 0,
        }
    }

    /// Attach a tag set
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Attach auxiliary cells
    pub fn with_aux(mut self, aux: Vec<CellValue>) -> Self {
        self.aux = aux;
        self
    }

    /// Set the aggregated counter
    pub fn with_aggregated(mut self, aggregated: u32) -> Self {
        self.aggregated = aggregated;
        self
    }
}

/// Point alias for float streams
pub type FloatPoint = Point<f64>;
/// Point alias for integer streams
pub type IntegerPoint = Point<i64>;
/// Point alias for string streams
pub type StringPoint = Point<String>;
/// Point alias for boolean streams
pub type BooleanPoint = Point<bool>;

/// A point of any of the four kinds, used at type-erased seams and in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPoint {
    /// Float point
    Float(FloatPoint),
    /// Integer point
    Integer(IntegerPoint),
    /// String point
    String(StringPoint),
    /// Boolean point
    Boolean(BooleanPoint),
}

impl AnyPoint {
    /// Measurement name
    pub fn name(&self) -> &str {
        match self {
            AnyPoint::Float(p) => &p.name,
            AnyPoint::Integer(p) => &p.name,
            AnyPoint::String(p) => &p.name,
            AnyPoint::Boolean(p) => &p.name,
        }
    }

    /// Tag set
    pub fn tags(&self) -> &Tags {
        match self {
            AnyPoint::Float(p) => &p.tags,
            AnyPoint::Integer(p) => &p.tags,
            AnyPoint::String(p) => &p.tags,
            AnyPoint::Boolean(p) => &p.tags,
        }
    }

    /// Timestamp in nanoseconds
    pub fn time(&self) -> i64 {
        match self {
            AnyPoint::Float(p) => p.time,
            AnyPoint::Integer(p) => p.time,
            AnyPoint::String(p) => p.time,
            AnyPoint::Boolean(p) => p.time,
        }
    }

    /// Auxiliary cells
    pub fn aux(&self) -> &[CellValue] {
        match self {
            AnyPoint::Float(p) => &p.aux,
            AnyPoint::Integer(p) => &p.aux,
            AnyPoint::String(p) => &p.aux,
            AnyPoint::Boolean(p) => &p.aux,
        }
    }

    /// Nil marker
    pub fn is_nil(&self) -> bool {
        match self {
            AnyPoint::Float(p) => p.nil,
            AnyPoint::Integer(p) => p.nil,
            AnyPoint::String(p) => p.nil,
            AnyPoint::Boolean(p) => p.nil,
        }
    }

    /// Point kind
    pub fn data_type(&self) -> DataType {
        match self {
            AnyPoint::Float(_) => DataType::Float,
            AnyPoint::Integer(_) => DataType::Integer,
            AnyPoint::String(_) => DataType::String,
            AnyPoint::Boolean(_) => DataType::Boolean,
        }
    }

    /// Primary value as a cell
    pub fn value_cell(&self) -> CellValue {
        match self {
            AnyPoint::Float(p) if p.nil => CellValue::Nil,
            AnyPoint::Integer(p) if p.nil => CellValue::Nil,
            AnyPoint::String(p) if p.nil => CellValue::Nil,
            AnyPoint::Boolean(p) if p.nil => CellValue::Nil,
            AnyPoint::Float(p) => CellValue::Float(p.value),
            AnyPoint::Integer(p) => CellValue::Integer(p.value),
            AnyPoint::String(p) => CellValue::String(p.value.clone()),
            AnyPoint::Boolean(p) => CellValue::Boolean(p.value),
        }
    }
}
