//! End-to-end planner scenarios against a mock shard mapper
//!
//! The mock mirrors the storage contract: per-shard raw iterators, with the
//! call iterator applied shard-side whenever the planner pushes an
//! aggregate down, then merged through `Iterators::merge`.

use gorilla_query::ast::BinaryOp;
use gorilla_query::iterator::VecIterator;
use gorilla_query::point::{
    AnyPoint, BooleanPoint, CellValue, DataType, FloatPoint, IntegerPoint, StringPoint, Tags,
};
use gorilla_query::select::select;
use gorilla_query::shard::{ShardGroup, ShardMapper};
use gorilla_query::{
    new_call_iterator, AnyIterator, Expr, Fill, IteratorOptions, Iterators, Measurement,
    QueryError, SelectOptions, SelectStatement, TimeRange,
};
use std::collections::{HashMap, HashSet};

const SECOND: i64 = 1_000_000_000;
const DAY: i64 = 86_400 * SECOND;

// ============================================================================
// Mock shard mapper
// ============================================================================

#[derive(Clone)]
enum ShardData {
    Float(Vec<Vec<FloatPoint>>),
    Integer(Vec<Vec<IntegerPoint>>),
    String(Vec<Vec<StringPoint>>),
    Boolean(Vec<Vec<BooleanPoint>>),
}

impl ShardData {
    fn iterators(&self) -> Vec<AnyIterator> {
        match self {
            ShardData::Float(shards) => shards
                .iter()
                .map(|s| AnyIterator::float(VecIterator::new(s.clone())))
                .collect(),
            ShardData::Integer(shards) => shards
                .iter()
                .map(|s| AnyIterator::integer(VecIterator::new(s.clone())))
                .collect(),
            ShardData::String(shards) => shards
                .iter()
                .map(|s| AnyIterator::string(VecIterator::new(s.clone())))
                .collect(),
            ShardData::Boolean(shards) => shards
                .iter()
                .map(|s| AnyIterator::boolean(VecIterator::new(s.clone())))
                .collect(),
        }
    }
}

#[derive(Clone)]
struct MockMapper {
    fields: HashMap<String, DataType>,
    dimensions: Vec<String>,
    data: ShardData,
    expected_expr: Option<Expr>,
}

impl MockMapper {
    fn new(field_type: DataType, data: ShardData) -> Self {
        Self {
            fields: HashMap::from([("value".to_string(), field_type)]),
            dimensions: vec!["host".to_string(), "region".to_string()],
            data,
            expected_expr: None,
        }
    }

    fn with_fields(mut self, fields: Vec<(&str, DataType)>) -> Self {
        self.fields = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self
    }

    fn expect_expr(mut self, expr: Expr) -> Self {
        self.expected_expr = Some(expr);
        self
    }
}

impl ShardMapper for MockMapper {
    fn map_shards(
        &self,
        _sources: &[Measurement],
        _range: &TimeRange,
        _options: &SelectOptions,
    ) -> gorilla_query::Result<Box<dyn ShardGroup>> {
        Ok(Box::new(MockGroup {
            mock: self.clone(),
        }))
    }
}

struct MockGroup {
    mock: MockMapper,
}

impl ShardGroup for MockGroup {
    fn create_iterator(
        &mut self,
        measurement: &str,
        options: &IteratorOptions,
    ) -> gorilla_query::Result<AnyIterator> {
        assert_eq!(measurement, "cpu", "unexpected source");
        if let Some(expected) = &self.mock.expected_expr {
            if matches!(options.expr, Some(Expr::Call { .. })) {
                assert_eq!(options.expr.as_ref(), Some(expected), "unexpected expr");
            }
        }
        let mut iterators = self.mock.data.iterators();
        if matches!(
            options.expr.as_ref().map(|e| e.unparenthesize()),
            Some(Expr::Call { .. })
        ) {
            let mut wrapped = Vec::with_capacity(iterators.len());
            for it in iterators {
                wrapped.push(new_call_iterator(it, options)?);
            }
            iterators = wrapped;
        }
        Iterators(iterators).merge(options)
    }

    fn field_dimensions(
        &self,
        _measurement: &str,
    ) -> gorilla_query::Result<(HashMap<String, DataType>, HashSet<String>)> {
        Ok((
            self.mock.fields.clone(),
            self.mock.dimensions.iter().cloned().collect(),
        ))
    }

    fn map_type(&self, _measurement: &str, field: &str) -> DataType {
        if let Some(t) = self.mock.fields.get(field) {
            return *t;
        }
        if self.mock.dimensions.iter().any(|d| d == field) {
            return DataType::Tag;
        }
        DataType::Unknown
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fp(tags: &str, secs: i64, value: f64) -> FloatPoint {
    FloatPoint::new("cpu", secs * SECOND, value).with_tags(Tags::parse(tags))
}

fn ip(tags: &str, secs: i64, value: i64) -> IntegerPoint {
    IntegerPoint::new("cpu", secs * SECOND, value).with_tags(Tags::parse(tags))
}

fn sp(tags: &str, secs: i64, value: &str) -> StringPoint {
    StringPoint::new("cpu", secs * SECOND, value.to_string()).with_tags(Tags::parse(tags))
}

fn bp(tags: &str, secs: i64, value: bool) -> BooleanPoint {
    BooleanPoint::new("cpu", secs * SECOND, value).with_tags(Tags::parse(tags))
}

/// Read one point from each returned iterator per row, like result assembly
/// does, until every iterator is exhausted.
fn read_all(mut iterators: Vec<AnyIterator>) -> Vec<Vec<AnyPoint>> {
    let mut rows = Vec::new();
    loop {
        let mut row = Vec::with_capacity(iterators.len());
        let mut live = 0;
        for it in iterators.iter_mut() {
            match it.next_any().unwrap() {
                Some(p) => {
                    live += 1;
                    row.push(p);
                }
                None => {}
            }
        }
        if live == 0 {
            break;
        }
        assert_eq!(live, iterators.len(), "iterators returned ragged rows");
        rows.push(row);
    }
    rows
}

fn run(stmt: &SelectStatement, mapper: &MockMapper) -> Vec<Vec<AnyPoint>> {
    let (iterators, _) = select(stmt, mapper, SelectOptions::default()).unwrap();
    read_all(iterators)
}

fn float_row(row: &[AnyPoint]) -> &FloatPoint {
    match &row[0] {
        AnyPoint::Float(p) => p,
        other => panic!("expected float point, got {:?}", other),
    }
}

fn expect_floats(rows: &[Vec<AnyPoint>], expected: &[(&str, i64, Option<f64>, u32)]) {
    assert_eq!(rows.len(), expected.len(), "row count mismatch: {:?}", rows);
    for (row, (tags, secs, value, aggregated)) in rows.iter().zip(expected) {
        let p = float_row(row);
        assert_eq!(p.tags, Tags::parse(tags), "tags at t={}", secs);
        assert_eq!(p.time, secs * SECOND, "time");
        match value {
            Some(v) => {
                assert!(!p.nil, "expected value at t={}", secs);
                assert!((p.value - v).abs() < 1e-9, "value at t={}: {}", secs, p.value);
            }
            None => assert!(p.nil, "expected nil at t={}", secs),
        }
        assert_eq!(p.aggregated, *aggregated, "aggregated at t={}", secs);
    }
}

fn min_max_input() -> ShardData {
    ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 11, 3.0),
            fp("region=west,host=A", 31, 100.0),
        ],
        vec![
            fp("region=east,host=A", 9, 19.0),
            fp("region=east,host=A", 10, 2.0),
        ],
        vec![fp("region=west,host=B", 5, 10.0)],
    ])
}

fn six_shard_input() -> ShardData {
    ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 11, 3.0),
            fp("region=west,host=A", 31, 100.0),
        ],
        vec![
            fp("region=west,host=B", 5, 10.0),
            fp("region=west,host=B", 50, 1.0),
            fp("region=west,host=B", 51, 2.0),
            fp("region=west,host=B", 52, 3.0),
            fp("region=west,host=B", 53, 4.0),
            fp("region=west,host=B", 53, 5.0),
        ],
        vec![
            fp("region=east,host=A", 9, 19.0),
            fp("region=east,host=A", 10, 2.0),
        ],
    ])
}

// ============================================================================
// Aggregations
// ============================================================================

#[test]
fn select_min_with_time_window() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("min", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, min_max_input())
        .expect_expr(Expr::call("min", vec![Expr::var_typed("value", DataType::Float)]));

    let rows = run(&stmt, &mapper);
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(19.0), 2),
            ("host=A", 10, Some(2.0), 2),
            ("host=A", 30, Some(100.0), 1),
            ("host=B", 0, Some(10.0), 1),
        ],
    );
}

#[test]
fn select_mean_combines_shard_partials() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("mean", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, six_shard_input());

    let rows = run(&stmt, &mapper);
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(19.5), 2),
            ("host=A", 10, Some(2.5), 2),
            ("host=A", 30, Some(100.0), 1),
            ("host=B", 0, Some(10.0), 1),
            ("host=B", 50, Some(3.0), 5),
        ],
    );
}

#[test]
fn select_count_rewrites_to_sum_across_shards() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("count", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, min_max_input());

    let rows = run(&stmt, &mapper);
    let counts: Vec<(i64, i64, String)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Integer(p) => (
                p.time / SECOND,
                p.value,
                p.tags.get("host").unwrap().to_string(),
            ),
            other => panic!("expected integer point, got {:?}", other),
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            (0, 2, "A".to_string()),
            (10, 2, "A".to_string()),
            (30, 1, "A".to_string()),
            (0, 1, "B".to_string()),
        ]
    );
}

#[test]
fn select_mean_on_strings_fails() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("mean", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::String, ShardData::String(vec![vec![]]));

    let err = select(&stmt, &mapper, SelectOptions::default()).unwrap_err();
    assert_eq!(err.to_string(), "unsupported mean iterator type: string");
}

#[test]
fn select_median_on_booleans_fails() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("median", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Boolean, ShardData::Boolean(vec![vec![]]));

    let err = select(&stmt, &mapper, SelectOptions::default()).unwrap_err();
    assert_eq!(err.to_string(), "unsupported median iterator type: boolean");
}

#[test]
fn select_median() {
    let data = ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 11, 3.0),
            fp("region=west,host=A", 31, 100.0),
        ],
        vec![
            fp("region=west,host=B", 5, 10.0),
            fp("region=west,host=B", 50, 1.0),
            fp("region=west,host=B", 51, 2.0),
            fp("region=west,host=B", 52, 3.0),
            fp("region=west,host=B", 53, 4.0),
            fp("region=west,host=B", 53, 5.0),
        ],
        vec![
            fp("region=east,host=A", 9, 19.0),
            fp("region=east,host=A", 10, 2.0),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("median", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(19.5), 0),
            ("host=A", 10, Some(2.5), 0),
            ("host=A", 30, Some(100.0), 0),
            ("host=B", 0, Some(10.0), 0),
            ("host=B", 50, Some(3.0), 0),
        ],
    );
}

#[test]
fn select_distinct_emits_first_seen_order() {
    let data = ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 1, 19.0),
        ],
        vec![fp("region=west,host=B", 5, 10.0)],
        vec![
            fp("region=east,host=A", 9, 19.0),
            fp("region=east,host=A", 10, 2.0),
            fp("region=east,host=A", 11, 2.0),
            fp("region=east,host=A", 12, 2.0),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("distinct", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(20.0), 0),
            ("host=A", 0, Some(19.0), 0),
            ("host=A", 10, Some(2.0), 0),
            ("host=B", 0, Some(10.0), 0),
        ],
    );
}

#[test]
fn select_distinct_boolean_emits_both_values_in_one_window() {
    let data = ShardData::Boolean(vec![
        vec![
            bp("region=west,host=A", 0, true),
            bp("region=west,host=A", 1, false),
        ],
        vec![bp("region=west,host=B", 5, false)],
        vec![
            bp("region=east,host=A", 9, true),
            bp("region=east,host=A", 10, false),
            bp("region=east,host=A", 11, false),
            bp("region=east,host=A", 12, true),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("distinct", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Boolean, data));

    let out: Vec<(String, i64, bool)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Boolean(p) => (
                p.tags.get("host").unwrap().to_string(),
                p.time / SECOND,
                p.value,
            ),
            other => panic!("expected boolean point, got {:?}", other),
        })
        .collect();
    assert_eq!(
        out,
        vec![
            ("A".to_string(), 0, true),
            ("A".to_string(), 0, false),
            ("A".to_string(), 10, false),
            ("A".to_string(), 10, true),
            ("B".to_string(), 0, false),
        ]
    );
}

#[test]
fn select_mode_string_and_tiebreak() {
    let data = ShardData::String(vec![
        vec![
            sp("region=west,host=A", 0, "a"),
            sp("region=west,host=A", 1, "a"),
        ],
        vec![
            sp("region=west,host=B", 5, "cxxx"),
            sp("region=west,host=B", 6, "zzzz"),
            sp("region=west,host=B", 7, "zzzz"),
            sp("region=west,host=B", 8, "zxxx"),
        ],
        vec![
            sp("region=east,host=A", 9, "b"),
            sp("region=east,host=A", 10, "d"),
            sp("region=east,host=A", 11, "d"),
            sp("region=east,host=A", 12, "d"),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("mode", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::String, data));

    let out: Vec<(String, i64, String)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::String(p) => (
                p.tags.get("host").unwrap().to_string(),
                p.time / SECOND,
                p.value.clone(),
            ),
            other => panic!("expected string point, got {:?}", other),
        })
        .collect();
    assert_eq!(
        out,
        vec![
            ("A".to_string(), 0, "a".to_string()),
            ("A".to_string(), 10, "d".to_string()),
            ("B".to_string(), 0, "zzzz".to_string()),
        ]
    );
}

#[test]
fn select_mode_boolean_tie_prefers_earliest() {
    let data = ShardData::Boolean(vec![vec![
        bp("region=west,host=B", 5, true),
        bp("region=west,host=B", 6, false),
    ]]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("mode", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Boolean, data));
    match &rows[0][0] {
        AnyPoint::Boolean(p) => assert!(p.value),
        other => panic!("expected boolean point, got {:?}", other),
    }
}

#[test]
fn select_stddev_emits_nil_below_two_values() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("stddev", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, six_shard_input()));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(0.7071067811865476), 0),
            ("host=A", 10, Some(0.7071067811865476), 0),
            ("host=A", 30, None, 0),
            ("host=B", 0, None, 0),
            ("host=B", 50, Some(1.5811388300841898), 0),
        ],
    );
}

#[test]
fn select_spread() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("spread", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, six_shard_input()));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(1.0), 0),
            ("host=A", 10, Some(1.0), 0),
            ("host=A", 30, Some(0.0), 0),
            ("host=B", 0, Some(0.0), 0),
            ("host=B", 50, Some(4.0), 0),
        ],
    );
}

#[test]
fn select_percentile() {
    let data = ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 11, 3.0),
            fp("region=west,host=A", 31, 100.0),
        ],
        vec![
            fp("region=west,host=B", 5, 10.0),
            fp("region=west,host=B", 50, 10.0),
            fp("region=west,host=B", 51, 9.0),
            fp("region=west,host=B", 52, 8.0),
            fp("region=west,host=B", 53, 7.0),
            fp("region=west,host=B", 54, 6.0),
            fp("region=west,host=B", 55, 5.0),
            fp("region=west,host=B", 56, 4.0),
            fp("region=west,host=B", 57, 3.0),
            fp("region=west,host=B", 58, 2.0),
            fp("region=west,host=B", 59, 1.0),
        ],
        vec![
            fp("region=east,host=A", 9, 19.0),
            fp("region=east,host=A", 10, 2.0),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "percentile",
            vec![Expr::var("value"), Expr::int(90)],
        ))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(20.0), 0),
            ("host=A", 10, Some(3.0), 0),
            ("host=A", 30, Some(100.0), 0),
            ("host=B", 0, Some(10.0), 0),
            ("host=B", 50, Some(9.0), 0),
        ],
    );
}

#[test]
fn select_percentile_integer_keeps_type() {
    let data = ShardData::Integer(vec![vec![
        ip("host=B", 50, 10),
        ip("host=B", 51, 9),
        ip("host=B", 52, 8),
        ip("host=B", 53, 7),
        ip("host=B", 54, 6),
        ip("host=B", 55, 5),
        ip("host=B", 56, 4),
        ip("host=B", 57, 3),
        ip("host=B", 58, 2),
        ip("host=B", 59, 1),
    ]]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "percentile",
            vec![Expr::var("value"), Expr::int(90)],
        ))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Integer, data));
    match &rows[0][0] {
        AnyPoint::Integer(p) => {
            assert_eq!(p.value, 9);
            assert_eq!(p.time, 50 * SECOND);
        }
        other => panic!("expected integer point, got {:?}", other),
    }
}

#[test]
fn select_sample_returns_all_points_when_under_k() {
    let data = ShardData::Float(vec![
        vec![
            fp("region=west,host=A", 0, 20.0),
            fp("region=west,host=A", 5, 10.0),
        ],
        vec![
            fp("region=east,host=B", 10, 19.0),
            fp("region=east,host=B", 15, 2.0),
        ],
    ]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("sample", vec![Expr::var("value"), Expr::int(2)]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(20.0), 0),
            ("host=A", 5, Some(10.0), 0),
            ("host=B", 10, Some(19.0), 0),
            ("host=B", 15, Some(2.0), 0),
        ],
    );
}

// ============================================================================
// Selectors
// ============================================================================

#[test]
fn select_top_without_tags() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("top", vec![Expr::var("value"), Expr::int(2)]))
        .time_range(0, DAY)
        .group_by_time(30 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Float, six_shard_input()));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(20.0), 0),
            ("host=A", 9, Some(19.0), 0),
            ("host=A", 31, Some(100.0), 0),
            ("host=B", 5, Some(10.0), 0),
            ("host=B", 53, Some(5.0), 0),
            ("host=B", 53, Some(4.0), 0),
        ],
    );
}

fn with_host_aux(data: ShardData) -> ShardData {
    // raw points carry the host tag as an aux string, as shards do when a
    // selector requests tag carry-over
    match data {
        ShardData::Float(shards) => ShardData::Float(
            shards
                .into_iter()
                .map(|shard| {
                    shard
                        .into_iter()
                        .map(|p| {
                            let host = p.tags.get("host").unwrap_or("").to_string();
                            p.with_aux(vec![CellValue::String(host)])
                        })
                        .collect()
                })
                .collect(),
        ),
        other => other,
    }
}

#[test]
fn select_top_with_tag_carry_over() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "top",
            vec![Expr::var("value"), Expr::var("host"), Expr::int(2)],
        ))
        .time_range(0, DAY)
        .group_by_time(30 * SECOND)
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, with_host_aux(six_shard_input()))
        .expect_expr(Expr::call("max", vec![Expr::var_typed("value", DataType::Float)]));

    let (iterators, columns) = select(&stmt, &mapper, SelectOptions::default()).unwrap();
    assert_eq!(columns, vec!["time", "top", "host"]);
    let rows = read_all(iterators);

    let out: Vec<(i64, f64, String)> = rows
        .iter()
        .map(|r| {
            let value = match &r[0] {
                AnyPoint::Float(p) => {
                    assert!(p.tags.is_empty(), "group tags are reset");
                    p.value
                }
                other => panic!("expected float point, got {:?}", other),
            };
            let host = match &r[1] {
                AnyPoint::String(p) => p.value.clone(),
                other => panic!("expected string point, got {:?}", other),
            };
            (r[0].time() / SECOND, value, host)
        })
        .collect();
    assert_eq!(
        out,
        vec![
            (0, 20.0, "A".to_string()),
            (5, 10.0, "B".to_string()),
            (31, 100.0, "A".to_string()),
            (53, 5.0, "B".to_string()),
        ]
    );
}

#[test]
fn select_top_with_tags_and_group_by() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "top",
            vec![Expr::var("value"), Expr::var("host"), Expr::int(1)],
        ))
        .time_range(0, DAY)
        .group_by_tag("region")
        .group_by_time(30 * SECOND)
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, with_host_aux(six_shard_input()));

    let rows = run(&stmt, &mapper);
    let out: Vec<(String, i64, f64, String)> = rows
        .iter()
        .map(|r| {
            let (region, value) = match &r[0] {
                AnyPoint::Float(p) => (
                    p.tags.get("region").unwrap_or("").to_string(),
                    p.value,
                ),
                other => panic!("expected float point, got {:?}", other),
            };
            let host = match &r[1] {
                AnyPoint::String(p) => p.value.clone(),
                other => panic!("expected string point, got {:?}", other),
            };
            (region, r[0].time() / SECOND, value, host)
        })
        .collect();
    assert_eq!(
        out,
        vec![
            ("east".to_string(), 9, 19.0, "A".to_string()),
            ("west".to_string(), 0, 20.0, "A".to_string()),
            ("west".to_string(), 31, 100.0, "A".to_string()),
        ]
    );
}

#[test]
fn select_bottom_with_tag_carry_over() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "bottom",
            vec![Expr::var("value"), Expr::var("host"), Expr::int(2)],
        ))
        .time_range(0, DAY)
        .group_by_time(30 * SECOND)
        .fill(Fill::None)
        .build();
    let mapper = MockMapper::new(DataType::Float, with_host_aux(six_shard_input()))
        .expect_expr(Expr::call("min", vec![Expr::var_typed("value", DataType::Float)]));

    let rows = run(&stmt, &mapper);
    let out: Vec<(i64, f64, String)> = rows
        .iter()
        .map(|r| {
            let value = match &r[0] {
                AnyPoint::Float(p) => p.value,
                other => panic!("expected float point, got {:?}", other),
            };
            let host = match &r[1] {
                AnyPoint::String(p) => p.value.clone(),
                other => panic!("expected string point, got {:?}", other),
            };
            (r[0].time() / SECOND, value, host)
        })
        .collect();
    assert_eq!(
        out,
        vec![
            (5, 10.0, "B".to_string()),
            (10, 2.0, "A".to_string()),
            (31, 100.0, "A".to_string()),
            (50, 1.0, "B".to_string()),
        ]
    );
}

// ============================================================================
// Fill
// ============================================================================

fn fill_stmt(fill: Fill) -> SelectStatement {
    SelectStatement::from("cpu")
        .field(Expr::call("mean", vec![Expr::var("value")]))
        .time_range(0, 60 * SECOND)
        .group_by_tag("host")
        .group_by_time(10 * SECOND)
        .fill(fill)
        .build()
}

fn fill_input() -> ShardData {
    ShardData::Float(vec![vec![fp("host=A", 12, 2.0)]])
}

#[test]
fn select_fill_null() {
    let rows = run(&fill_stmt(Fill::Null), &MockMapper::new(DataType::Float, fill_input()));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, None, 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, None, 0),
            ("host=A", 30, None, 0),
            ("host=A", 40, None, 0),
            ("host=A", 50, None, 0),
        ],
    );
}

#[test]
fn select_fill_number() {
    let rows = run(
        &fill_stmt(Fill::Number(1.0)),
        &MockMapper::new(DataType::Float, fill_input()),
    );
    expect_floats(
        &rows,
        &[
            ("host=A", 0, Some(1.0), 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, Some(1.0), 0),
            ("host=A", 30, Some(1.0), 0),
            ("host=A", 40, Some(1.0), 0),
            ("host=A", 50, Some(1.0), 0),
        ],
    );
}

#[test]
fn select_fill_previous() {
    let rows = run(
        &fill_stmt(Fill::Previous),
        &MockMapper::new(DataType::Float, fill_input()),
    );
    expect_floats(
        &rows,
        &[
            ("host=A", 0, None, 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, Some(2.0), 0),
            ("host=A", 30, Some(2.0), 0),
            ("host=A", 40, Some(2.0), 0),
            ("host=A", 50, Some(2.0), 0),
        ],
    );
}

#[test]
fn select_fill_linear_one_gap() {
    let data = ShardData::Float(vec![vec![fp("host=A", 12, 2.0), fp("host=A", 32, 4.0)]]);
    let rows = run(&fill_stmt(Fill::Linear), &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, None, 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, Some(3.0), 0),
            ("host=A", 30, Some(4.0), 1),
            ("host=A", 40, None, 0),
            ("host=A", 50, None, 0),
        ],
    );
}

#[test]
fn select_fill_linear_many() {
    // the trailing point lands on the end bucket; it still passes through
    // and anchors the interpolation
    let data = ShardData::Float(vec![vec![fp("host=A", 12, 2.0), fp("host=A", 62, 7.0)]]);
    let rows = run(&fill_stmt(Fill::Linear), &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, None, 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, Some(3.0), 0),
            ("host=A", 30, Some(4.0), 0),
            ("host=A", 40, Some(5.0), 0),
            ("host=A", 50, Some(6.0), 0),
            ("host=A", 60, Some(7.0), 1),
        ],
    );
}

#[test]
fn select_fill_linear_does_not_cross_series() {
    let data = ShardData::Float(vec![vec![
        fp("host=A", 12, 2.0),
        fp("host=B", 32, 4.0),
    ]]);
    let rows = run(&fill_stmt(Fill::Linear), &MockMapper::new(DataType::Float, data));
    expect_floats(
        &rows,
        &[
            ("host=A", 0, None, 0),
            ("host=A", 10, Some(2.0), 1),
            ("host=A", 20, None, 0),
            ("host=A", 30, None, 0),
            ("host=A", 40, None, 0),
            ("host=A", 50, None, 0),
            ("host=B", 0, None, 0),
            ("host=B", 10, None, 0),
            ("host=B", 20, None, 0),
            ("host=B", 30, Some(4.0), 1),
            ("host=B", 40, None, 0),
            ("host=B", 50, None, 0),
        ],
    );
}

#[test]
fn select_fill_linear_integer_truncates() {
    let data = ShardData::Integer(vec![vec![ip("host=A", 12, 1), ip("host=A", 32, 4)]]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("max", vec![Expr::var("value")]))
        .time_range(0, 60 * SECOND)
        .group_by_tag("host")
        .group_by_time(10 * SECOND)
        .fill(Fill::Linear)
        .build();
    let rows = run(&stmt, &MockMapper::new(DataType::Integer, data));
    let out: Vec<(i64, Option<i64>)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Integer(p) => (p.time / SECOND, (!p.nil).then_some(p.value)),
            other => panic!("expected integer point, got {:?}", other),
        })
        .collect();
    assert_eq!(
        out,
        vec![
            (0, None),
            (10, Some(1)),
            (20, Some(2)),
            (30, Some(4)),
            (40, None),
            (50, None),
        ]
    );
}

// ============================================================================
// Transforms
// ============================================================================

fn transform_stmt(call: Expr, end_secs: i64) -> SelectStatement {
    SelectStatement::from("cpu")
        .field(call)
        .time_range(0, end_secs * SECOND)
        .build()
}

fn plain_points(values: &[(i64, f64)]) -> ShardData {
    ShardData::Float(vec![values
        .iter()
        .map(|(t, v)| FloatPoint::new("cpu", t * SECOND, *v))
        .collect()])
}

fn expect_plain_floats(rows: &[Vec<AnyPoint>], expected: &[(i64, f64)]) {
    assert_eq!(rows.len(), expected.len(), "row count: {:?}", rows);
    for (row, (secs, value)) in rows.iter().zip(expected) {
        let p = float_row(row);
        assert_eq!(p.time, secs * SECOND);
        assert!((p.value - value).abs() < 1e-9, "value {}", p.value);
    }
}

#[test]
fn select_derivative() {
    let stmt = transform_stmt(
        Expr::call("derivative", vec![Expr::var("value"), Expr::seconds(1)]),
        16,
    );
    let data = plain_points(&[(0, 20.0), (4, 10.0), (8, 19.0), (12, 3.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(4, -2.5), (8, 2.25), (12, -4.0)]);
}

#[test]
fn select_derivative_descending() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "derivative",
            vec![Expr::var("value"), Expr::seconds(1)],
        ))
        .time_range(0, 16 * SECOND)
        .descending()
        .build();
    let data = plain_points(&[(12, 3.0), (8, 19.0), (4, 10.0), (0, 20.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(8, 4.0), (4, -2.25), (0, 2.5)]);
}

#[test]
fn select_derivative_collapses_duplicate_timestamps() {
    let stmt = transform_stmt(
        Expr::call("derivative", vec![Expr::var("value"), Expr::seconds(1)]),
        16,
    );
    let data = plain_points(&[(0, 20.0), (0, 19.0), (4, 10.0), (4, 3.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(4, -2.5)]);
}

#[test]
fn select_non_negative_difference() {
    let stmt = transform_stmt(
        Expr::call("non_negative_difference", vec![Expr::var("value")]),
        20,
    );
    let data = plain_points(&[(0, 20.0), (4, 10.0), (8, 29.0), (12, 3.0), (16, 39.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(8, 19.0), (16, 36.0)]);
}

#[test]
fn select_difference_integer() {
    let stmt = transform_stmt(Expr::call("difference", vec![Expr::var("value")]), 16);
    let data = ShardData::Integer(vec![vec![
        IntegerPoint::new("cpu", 0, 20),
        IntegerPoint::new("cpu", 4 * SECOND, 10),
        IntegerPoint::new("cpu", 8 * SECOND, 19),
        IntegerPoint::new("cpu", 12 * SECOND, 3),
    ]]);
    let rows = run(&stmt, &MockMapper::new(DataType::Integer, data));
    let out: Vec<(i64, i64)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Integer(p) => (p.time / SECOND, p.value),
            other => panic!("expected integer point, got {:?}", other),
        })
        .collect();
    assert_eq!(out, vec![(4, -10), (8, 9), (12, -16)]);
}

#[test]
fn select_elapsed_on_strings_returns_integers() {
    let stmt = transform_stmt(
        Expr::call("elapsed", vec![Expr::var("value"), Expr::seconds(1)]),
        16,
    );
    let data = ShardData::String(vec![vec![
        StringPoint::new("cpu", 0, "a".to_string()),
        StringPoint::new("cpu", 4 * SECOND, "b".to_string()),
        StringPoint::new("cpu", 8 * SECOND, "c".to_string()),
        StringPoint::new("cpu", 11 * SECOND, "d".to_string()),
    ]]);
    let rows = run(&stmt, &MockMapper::new(DataType::String, data));
    let out: Vec<(i64, i64)> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Integer(p) => (p.time / SECOND, p.value),
            other => panic!("expected integer point, got {:?}", other),
        })
        .collect();
    assert_eq!(out, vec![(4, 4), (8, 4), (11, 3)]);
}

#[test]
fn select_moving_average() {
    let stmt = transform_stmt(
        Expr::call("moving_average", vec![Expr::var("value"), Expr::int(2)]),
        16,
    );
    let data = plain_points(&[(0, 20.0), (4, 10.0), (8, 19.0), (12, 3.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(4, 15.0), (8, 14.5), (12, 11.0)]);
    for row in &rows {
        assert_eq!(float_row(row).aggregated, 2);
    }
}

#[test]
fn select_cumulative_sum_keeps_duplicates() {
    let stmt = transform_stmt(Expr::call("cumulative_sum", vec![Expr::var("value")]), 16);
    let data = plain_points(&[(0, 20.0), (0, 19.0), (4, 10.0), (4, 3.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(0, 20.0), (0, 39.0), (4, 49.0), (4, 52.0)]);
}

#[test]
fn select_integral_with_window_interpolation() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("integral", vec![Expr::var("value")]))
        .condition(Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Gt, Expr::var("time"), Expr::seconds(0)),
            Expr::binary(BinaryOp::Lt, Expr::var("time"), Expr::seconds(60)),
        ))
        .group_by_time(20 * SECOND)
        .build();
    let data = plain_points(&[(10, 20.0), (15, 10.0), (25, 0.0), (30, -10.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    expect_plain_floats(&rows, &[(0, 112.5), (20, -12.5)]);
}

#[test]
fn select_derivative_of_mean() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "derivative",
            vec![
                Expr::call("mean", vec![Expr::var("value")]),
                Expr::seconds(10),
            ],
        ))
        .time_range(0, 30 * SECOND)
        .group_by_time(10 * SECOND)
        .fill(Fill::None)
        .build();
    let data = plain_points(&[(0, 10.0), (5, 20.0), (12, 30.0), (22, 15.0)]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    // window means: 15 @0, 30 @10, 15 @20
    expect_plain_floats(&rows, &[(10, 15.0), (20, -15.0)]);
}

#[test]
fn select_holt_winters_forecast_shape() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call(
            "holt_winters",
            vec![
                Expr::call("mean", vec![Expr::var("value")]),
                Expr::int(2),
                Expr::int(2),
            ],
        ))
        .time_range(10 * SECOND, 20 * SECOND)
        .group_by_time(2 * SECOND)
        .build();
    let data = plain_points(&[
        (10, 4.0),
        (11, 6.0),
        (12, 9.0),
        (13, 11.0),
        (14, 5.0),
        (15, 7.0),
        (16, 10.0),
        (17, 12.0),
        (18, 6.0),
        (19, 8.0),
    ]);
    let rows = run(&stmt, &MockMapper::new(DataType::Float, data));
    assert_eq!(rows.len(), 2);
    let first = float_row(&rows[0]);
    let second = float_row(&rows[1]);
    assert_eq!(first.time, 20 * SECOND);
    assert_eq!(second.time, 22 * SECOND);
    // buckets alternate ~5,10,6,11,7; the high season comes next
    assert!(first.value > second.value);
    assert!(first.value > 8.0 && first.value < 16.0);
    assert!(second.value > 4.0 && second.value < 11.0);
}

// ============================================================================
// Binary expressions
// ============================================================================

fn binary_mapper(cells: Vec<Vec<CellValue>>, fields: Vec<(&str, DataType)>) -> MockMapper {
    let times = [0i64, 5, 9];
    let points: Vec<FloatPoint> = cells
        .into_iter()
        .zip(times)
        .map(|(aux, t)| FloatPoint::new("cpu", t * SECOND, 0.0).with_aux(aux))
        .collect();
    MockMapper::new(DataType::Float, ShardData::Float(vec![points])).with_fields(fields)
}

fn float_cells(values: [f64; 3], width: usize) -> Vec<Vec<CellValue>> {
    values
        .iter()
        .map(|v| vec![CellValue::Float(*v); width])
        .collect()
}

#[test]
fn select_binary_add_literal() {
    let mapper = binary_mapper(
        float_cells([20.0, 10.0, 19.0], 1),
        vec![("value", DataType::Float)],
    );
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::Add, Expr::var("value"), Expr::float(2.0)))
        .build();
    let rows = run(&stmt, &mapper);
    expect_plain_floats(&rows, &[(0, 22.0), (5, 12.0), (9, 21.0)]);
}

#[test]
fn select_binary_two_variable_multiplication() {
    let mapper = binary_mapper(
        float_cells([20.0, 10.0, 19.0], 1),
        vec![("value", DataType::Float)],
    );
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::Mul, Expr::var("value"), Expr::var("value")))
        .build();
    let rows = run(&stmt, &mapper);
    expect_plain_floats(&rows, &[(0, 400.0), (5, 100.0), (9, 361.0)]);
}

#[test]
fn select_binary_division_always_floats() {
    let cells: Vec<Vec<CellValue>> = [20i64, 10, 19]
        .iter()
        .map(|v| vec![CellValue::Integer(*v)])
        .collect();
    let mapper = binary_mapper(cells, vec![("value", DataType::Integer)]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::Div, Expr::var("value"), Expr::int(2)))
        .build();
    let rows = run(&stmt, &mapper);
    expect_plain_floats(&rows, &[(0, 10.0), (5, 5.0), (9, 9.5)]);
}

#[test]
fn select_binary_integer_bitwise() {
    let cells: Vec<Vec<CellValue>> = [20i64, 10, 19]
        .iter()
        .map(|v| vec![CellValue::Integer(*v)])
        .collect();
    let mapper = binary_mapper(cells, vec![("value", DataType::Integer)]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::BitAnd, Expr::var("value"), Expr::int(254)))
        .build();
    let rows = run(&stmt, &mapper);
    let out: Vec<i64> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Integer(p) => p.value,
            other => panic!("expected integer point, got {:?}", other),
        })
        .collect();
    assert_eq!(out, vec![20, 10, 18]);
}

#[test]
fn select_binary_mixed_types_upconvert() {
    let cells = vec![
        vec![CellValue::Float(20.0), CellValue::Integer(10)],
        vec![CellValue::Float(10.0), CellValue::Integer(15)],
        vec![CellValue::Float(19.0), CellValue::Integer(5)],
    ];
    let mapper = binary_mapper(
        cells,
        vec![("total", DataType::Float), ("value", DataType::Integer)],
    );
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::Sub, Expr::var("total"), Expr::var("value")))
        .build();
    let rows = run(&stmt, &mapper);
    expect_plain_floats(&rows, &[(0, 10.0), (5, -5.0), (9, 14.0)]);
}

#[test]
fn select_binary_boolean_xor() {
    let cells = vec![
        vec![CellValue::Boolean(true)],
        vec![CellValue::Boolean(false)],
        vec![CellValue::Boolean(true)],
    ];
    let mapper = binary_mapper(cells, vec![("one", DataType::Boolean)]);
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::BitXor, Expr::var("one"), Expr::bool(true)))
        .build();
    let rows = run(&stmt, &mapper);
    let out: Vec<bool> = rows
        .iter()
        .map(|r| match &r[0] {
            AnyPoint::Boolean(p) => p.value,
            other => panic!("expected boolean point, got {:?}", other),
        })
        .collect();
    assert_eq!(out, vec![false, true, false]);
}

#[test]
fn select_binary_nil_propagation() {
    let cells = vec![
        vec![CellValue::Nil, CellValue::Float(20.0)],
        vec![CellValue::Float(10.0), CellValue::Float(15.0)],
        vec![CellValue::Float(19.0), CellValue::Nil],
    ];
    let mapper = binary_mapper(
        cells,
        vec![("total", DataType::Float), ("value", DataType::Float)],
    );
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::Add, Expr::var("total"), Expr::var("value")))
        .build();
    let rows = run(&stmt, &mapper);
    assert_eq!(rows.len(), 3);
    assert!(rows[0][0].is_nil());
    assert_eq!(float_row(&rows[1]).value, 25.0);
    assert!(rows[2][0].is_nil());
}

#[test]
fn select_binary_incompatible_bitwise_rejected() {
    let mapper = binary_mapper(
        float_cells([1.0, 2.0, 3.0], 1),
        vec![("value", DataType::Integer), ("flag", DataType::Boolean)],
    );
    let stmt = SelectStatement::from("cpu")
        .field(Expr::binary(BinaryOp::BitAnd, Expr::var("value"), Expr::var("flag")))
        .build();
    let err = select(&stmt, &mapper, SelectOptions::default()).unwrap_err();
    assert!(matches!(err, QueryError::IncompatibleTypes { .. }));
}

// ============================================================================
// Raw projections
// ============================================================================

#[test]
fn select_raw_multi_field_fanout() {
    let cells = vec![
        vec![CellValue::Float(1.0), CellValue::Nil],
        vec![CellValue::Nil, CellValue::Float(2.0)],
        vec![CellValue::Float(3.0), CellValue::Float(4.0)],
    ];
    let times = [0i64, 1, 5];
    let points: Vec<FloatPoint> = cells
        .into_iter()
        .zip(times)
        .map(|(aux, t)| FloatPoint::new("cpu", t * SECOND, 0.0).with_aux(aux))
        .collect();
    let mapper = MockMapper::new(DataType::Float, ShardData::Float(vec![points]))
        .with_fields(vec![("v1", DataType::Float), ("v2", DataType::Float)]);

    let stmt = SelectStatement::from("cpu")
        .field(Expr::var("v1"))
        .field(Expr::var("v2"))
        .build();
    let (iterators, columns) = select(&stmt, &mapper, SelectOptions::default()).unwrap();
    assert_eq!(columns, vec!["time", "v1", "v2"]);

    let rows = read_all(iterators);
    let as_pair = |p: &AnyPoint| match p {
        AnyPoint::Float(p) => (p.time / SECOND, (!p.nil).then_some(p.value)),
        other => panic!("expected float point, got {:?}", other),
    };
    assert_eq!(rows.len(), 3);
    assert_eq!(as_pair(&rows[0][0]), (0, Some(1.0)));
    assert_eq!(as_pair(&rows[0][1]), (0, None));
    assert_eq!(as_pair(&rows[1][0]), (1, None));
    assert_eq!(as_pair(&rows[1][1]), (1, Some(2.0)));
    assert_eq!(as_pair(&rows[2][0]), (5, Some(3.0)));
    assert_eq!(as_pair(&rows[2][1]), (5, Some(4.0)));
}

#[test]
fn select_rejects_mixed_raw_and_aggregate() {
    let mapper = MockMapper::new(DataType::Float, min_max_input());
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("min", vec![Expr::var("value")]))
        .field(Expr::var("value"))
        .build();
    let err = select(&stmt, &mapper, SelectOptions::default()).unwrap_err();
    assert!(matches!(err, QueryError::InvalidStatement(_)));
}

// ============================================================================
// Ordering property
// ============================================================================

#[test]
fn select_output_is_ordered_by_series_then_time() {
    let stmt = SelectStatement::from("cpu")
        .field(Expr::call("min", vec![Expr::var("value")]))
        .time_range(0, DAY)
        .group_by_time(10 * SECOND)
        .group_by_tag("host")
        .fill(Fill::None)
        .build();
    let rows = run(
        &stmt,
        &MockMapper::new(DataType::Float, six_shard_input()),
    );

    let keys: Vec<(String, i64)> = rows
        .iter()
        .map(|r| {
            let p = float_row(r);
            (p.tags.id(), p.time)
        })
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "output must be non-decreasing by (tags, time)");
}
