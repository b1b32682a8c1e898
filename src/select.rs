//! The planner: from a parsed statement to one iterator per projection
//!
//! `select` maps shards, derives the [`IteratorOptions`] control packet
//! from the statement, classifies each projection (raw, call,
//! selector-with-tags, transform over call, binary expression) and builds
//! its iterator stack: shard iterators → merge → call combine → time snap →
//! transform → fill → paging. The returned iterators align with the
//! projection order; the column list carries `time` first.
//!
//! Construction errors abort the whole plan; everything already built is
//! closed before the error returns.

use crate::ast::{BinaryOp, Expr, Fill, Literal, SelectStatement, VarRef};
use crate::error::{QueryError, Result};
use crate::iterator::{AnyIterator, Iterators};
use crate::operators::aux::{AuxFanout, AuxTarget};
use crate::operators::binary::{
    binary_expr_type, new_binary_aux_iterator, new_binary_join_iterator, NestedOperand, Operand,
};
use crate::operators::fill::new_fill_iterator;
use crate::operators::modifiers::{
    new_dedupe_iterator, new_interval_iterator, new_limit_iterator, new_slimit_iterator,
};
use crate::operators::reduce::{
    new_distinct_iterator, new_median_iterator, new_mode_iterator, new_percentile_iterator,
    new_sample_iterator, new_spread_iterator, new_stddev_iterator,
};
use crate::operators::selector::{new_bottom_iterator, new_top_iterator};
use crate::operators::transform::{
    new_cumulative_sum_iterator, new_derivative_iterator, new_difference_iterator,
    new_elapsed_iterator, new_integral_iterator, new_moving_average_iterator,
};
use crate::holt_winters::new_holt_winters_iterator;
use crate::options::{split_time_condition, Interval, IteratorOptions, SelectOptions};
use crate::point::DataType;
use crate::shard::{IteratorCost, ShardGroup, ShardMapper};
use tracing::debug;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Execute the planning phase of a `SELECT` statement.
///
/// Returns one iterator per projected expression (selector-with-tags
/// projections append one string iterator per carried tag) and the output
/// column names, `time` first.
pub fn select(
    stmt: &SelectStatement,
    shard_mapper: &dyn ShardMapper,
    options: SelectOptions,
) -> Result<(Vec<AnyIterator>, Vec<String>)> {
    if stmt.fields.is_empty() {
        return Err(QueryError::InvalidStatement(
            "at least one non-time field must be queried".into(),
        ));
    }
    if stmt.sources.is_empty() {
        return Err(QueryError::InvalidStatement(
            "statement has no sources".into(),
        ));
    }

    let (range, residual) = split_time_condition(stmt.condition.as_ref());
    let mut group = shard_mapper.map_shards(&stmt.sources, &range, &options)?;

    let (every, offset) = stmt.time_dimension().unwrap_or((0, 0));
    let dimensions = stmt.tag_dimensions();
    let opt = IteratorOptions {
        expr: None,
        aux: Vec::new(),
        sources: stmt.sources.clone(),
        interval: Interval { every, offset },
        dimensions: dimensions.clone(),
        group_by: dimensions.iter().cloned().collect(),
        fill: stmt.fill,
        condition: residual,
        start_time: range.min,
        end_time: range.max,
        limit: stmt.limit,
        offset: stmt.offset,
        slimit: stmt.slimit,
        soffset: stmt.soffset,
        ascending: stmt.ascending,
        dedupe: stmt.dedupe,
    };

    let result = build_statement(stmt, group.as_mut(), &opt);
    group.close();
    result
}

fn build_statement(
    stmt: &SelectStatement,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<(Vec<AnyIterator>, Vec<String>)> {
    let mut cost = IteratorCost::default();
    for source in &stmt.sources {
        if let Ok(c) = group.iterator_cost(&source.name, opt) {
            cost = cost.combine(&c);
        }
    }
    debug!(
        fields = stmt.fields.len(),
        sources = stmt.sources.len(),
        series = cost.num_series,
        points = cost.point_count,
        "planning select"
    );

    let has_call = stmt.fields.iter().any(|f| f.expr.has_call());
    let all_calls = stmt.fields.iter().all(|f| f.expr.has_call());
    if has_call && !all_calls {
        return Err(QueryError::InvalidStatement(
            "mixing aggregate and non-aggregate queries is not supported".into(),
        ));
    }

    let mut iterators: Vec<AnyIterator> = Vec::new();
    let mut columns: Vec<String> = vec!["time".to_string()];

    let build = if has_call {
        build_call_fields(stmt, group, opt, &mut iterators, &mut columns)
    } else {
        build_raw_fields(stmt, group, opt, &mut iterators, &mut columns)
    };
    if let Err(e) = build {
        for mut it in iterators {
            it.close();
        }
        return Err(e);
    }

    // Paging applies uniformly to every returned iterator.
    let iterators = iterators
        .into_iter()
        .map(|mut it| {
            if opt.limit > 0 || opt.offset > 0 {
                it = new_limit_iterator(it, opt.limit, opt.offset);
            }
            if opt.slimit > 0 || opt.soffset > 0 {
                it = new_slimit_iterator(it, opt.slimit, opt.soffset);
            }
            it
        })
        .collect();

    Ok((iterators, columns))
}

// ============================================================================
// Raw projections
// ============================================================================

fn build_raw_fields(
    stmt: &SelectStatement,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
    iterators: &mut Vec<AnyIterator>,
    columns: &mut Vec<String>,
) -> Result<()> {
    // One shard iterator carries every referenced field in its aux cells;
    // the projections read them back positionally.
    let mut refs: Vec<VarRef> = Vec::new();
    for field in &stmt.fields {
        for r in field.expr.var_refs() {
            if !refs.iter().any(|existing| existing.name == r.name) {
                refs.push(r);
            }
        }
    }
    if let Some(cond) = &opt.condition {
        for r in cond.var_refs() {
            if r.name != "time" && !refs.iter().any(|existing| existing.name == r.name) {
                refs.push(r);
            }
        }
    }
    if refs.is_empty() {
        return Err(QueryError::InvalidStatement(
            "statement selects no fields".into(),
        ));
    }
    for r in refs.iter_mut() {
        r.data_type = resolve_type(group, &opt.sources, &r.name, r.data_type);
    }

    let mut raw_opt = opt.clone();
    raw_opt.expr = None;
    raw_opt.aux = refs.clone();

    let mut inputs = Vec::with_capacity(opt.sources.len());
    for source in &opt.sources {
        inputs.push(group.create_iterator(&source.name, &raw_opt)?);
    }
    let mut merged = Iterators(inputs).merge(&raw_opt)?;
    if opt.dedupe {
        merged = new_dedupe_iterator(merged);
    }

    let source_kind = merged.data_type();
    let mut fanout = AuxFanout::new(merged);
    for field in &stmt.fields {
        columns.push(field.name());
        match field.expr.unparenthesize() {
            Expr::VarRef(v) => {
                let pos = refs
                    .iter()
                    .position(|r| r.name == v.name)
                    .unwrap_or_default();
                iterators.push(fanout.output(AuxTarget::Cell(pos), refs[pos].data_type));
            }
            expr @ Expr::Binary { .. } => {
                let (operand, out) = build_operand(expr, &refs)?;
                let Operand::Nested(nested) = operand else {
                    return Err(QueryError::UnsupportedExpression(expr.to_string()));
                };
                let source = fanout.output(AuxTarget::Primary, source_kind);
                iterators.push(new_binary_aux_iterator(
                    source, nested.op, nested.lhs, nested.rhs, out,
                )?);
            }
            other => {
                return Err(QueryError::UnsupportedExpression(other.to_string()));
            }
        }
    }
    Ok(())
}

/// Lower an expression over the raw aux cells into an [`Operand`] tree,
/// resolving its output type.
fn build_operand(expr: &Expr, refs: &[VarRef]) -> Result<(Operand, DataType)> {
    match expr.unparenthesize() {
        Expr::VarRef(v) => {
            let pos = refs
                .iter()
                .position(|r| r.name == v.name)
                .ok_or_else(|| QueryError::UnknownField(v.name.clone()))?;
            Ok((Operand::Cell(pos), refs[pos].data_type))
        }
        Expr::Literal(Literal::Integer(v)) => Ok((Operand::Integer(*v), DataType::Integer)),
        Expr::Literal(Literal::Float(v)) => Ok((Operand::Float(*v), DataType::Float)),
        Expr::Literal(Literal::Boolean(v)) => Ok((Operand::Boolean(*v), DataType::Boolean)),
        Expr::Binary { op, lhs, rhs } => {
            let (left, left_type) = build_operand(lhs, refs)?;
            let (right, right_type) = build_operand(rhs, refs)?;
            let out = binary_expr_type(*op, left_type, right_type)?;
            Ok((
                Operand::Nested(Box::new(NestedOperand {
                    op: *op,
                    lhs: left,
                    rhs: right,
                    out,
                })),
                out,
            ))
        }
        other => Err(QueryError::UnsupportedExpression(other.to_string())),
    }
}

// ============================================================================
// Aggregate projections
// ============================================================================

fn build_call_fields(
    stmt: &SelectStatement,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
    iterators: &mut Vec<AnyIterator>,
    columns: &mut Vec<String>,
) -> Result<()> {
    for field in &stmt.fields {
        columns.push(field.name());
        match field.expr.unparenthesize() {
            Expr::Call { name, args } => {
                let parts = build_call(name, args, group, opt)?;
                for (it, extra_column) in parts {
                    if let Some(col) = extra_column {
                        columns.push(col);
                    }
                    iterators.push(it);
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                iterators.push(build_call_binary(*op, lhs, rhs, group, opt)?);
            }
            other => {
                return Err(QueryError::UnsupportedExpression(other.to_string()));
            }
        }
    }
    Ok(())
}

/// Build one call projection. Selector-with-tags projections return the
/// selector plus one string iterator per carried tag, with its column name.
fn build_call(
    name: &str,
    args: &[Expr],
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<Vec<(AnyIterator, Option<String>)>> {
    let single = |it: AnyIterator| vec![(it, None)];
    match name {
        "count" | "sum" | "min" | "max" | "first" | "last" | "mean" => {
            let var = call_field_arg(name, args, 1, 1)?;
            let input = shard_call_iterator(name, &var, group, opt)?;
            let snapped = new_interval_iterator(input, opt);
            Ok(single(new_fill_iterator(snapped, opt)))
        }
        "distinct" => {
            let var = call_field_arg(name, args, 1, 1)?;
            let input = raw_field_iterator(&var, group, opt)?;
            let it = new_distinct_iterator(input, opt)?;
            Ok(single(new_fill_iterator(it, opt)))
        }
        "median" | "mode" | "stddev" | "spread" => {
            let var = call_field_arg(name, args, 1, 1)?;
            let input = raw_field_iterator(&var, group, opt)?;
            let it = match name {
                "median" => new_median_iterator(input, opt)?,
                "mode" => new_mode_iterator(input, opt)?,
                "stddev" => new_stddev_iterator(input, opt)?,
                _ => new_spread_iterator(input, opt)?,
            };
            Ok(single(new_fill_iterator(it, opt)))
        }
        "percentile" => {
            let var = call_field_arg(name, args, 2, 2)?;
            let p = number_arg(name, args.get(1))?;
            let input = raw_field_iterator(&var, group, opt)?;
            let it = new_percentile_iterator(input, opt, p)?;
            Ok(single(new_fill_iterator(it, opt)))
        }
        "sample" => {
            let var = call_field_arg(name, args, 2, 2)?;
            let k = integer_arg(name, args.get(1))?;
            let input = raw_field_iterator(&var, group, opt)?;
            Ok(single(new_sample_iterator(input, opt, k as usize)?))
        }
        "top" | "bottom" => build_selector(name, args, group, opt),
        "derivative" | "non_negative_derivative" => {
            let non_negative = name == "non_negative_derivative";
            let input = transform_input(name, args, group, opt)?;
            let unit = duration_arg(args.get(1), NANOS_PER_SECOND)?;
            Ok(single(new_derivative_iterator(input, opt, unit, non_negative)?))
        }
        "difference" | "non_negative_difference" => {
            let non_negative = name == "non_negative_difference";
            let input = transform_input(name, args, group, opt)?;
            Ok(single(new_difference_iterator(input, opt, non_negative)?))
        }
        "elapsed" => {
            let input = transform_input(name, args, group, opt)?;
            let unit = duration_arg(args.get(1), 1)?;
            Ok(single(new_elapsed_iterator(input, opt, unit)?))
        }
        "moving_average" => {
            let n = integer_arg(name, args.get(1))?;
            if n < 1 {
                return Err(QueryError::InvalidArguments {
                    call: name.into(),
                    message: format!("window must be at least 1, got {}", n),
                });
            }
            let input = transform_input(name, args, group, opt)?;
            Ok(single(new_moving_average_iterator(input, opt, n as usize)?))
        }
        "cumulative_sum" => {
            let input = transform_input(name, args, group, opt)?;
            Ok(single(new_cumulative_sum_iterator(input, opt)?))
        }
        "integral" => {
            let input = transform_input(name, args, group, opt)?;
            let unit = duration_arg(args.get(1), NANOS_PER_SECOND)?;
            Ok(single(new_integral_iterator(input, opt, unit)?))
        }
        "holt_winters" | "holt_winters_with_fit" => {
            if opt.interval.is_zero() {
                return Err(QueryError::InvalidArguments {
                    call: name.into(),
                    message: "aggregate requires a GROUP BY time interval".into(),
                });
            }
            let inner = match args.first().map(|e| e.unparenthesize()) {
                Some(Expr::Call {
                    name: inner_name,
                    args: inner_args,
                }) => {
                    let mut parts = build_call(inner_name, inner_args, group, opt)?;
                    if parts.len() != 1 {
                        return Err(QueryError::InvalidArguments {
                            call: name.into(),
                            message: "argument must be a single aggregate".into(),
                        });
                    }
                    let (it, _) = parts.remove(0);
                    it
                }
                _ => {
                    return Err(QueryError::InvalidArguments {
                        call: name.into(),
                        message: "first argument must be an aggregate call".into(),
                    })
                }
            };
            let h = integer_arg(name, args.get(1))?;
            let m = integer_arg(name, args.get(2))?;
            Ok(single(new_holt_winters_iterator(
                inner,
                opt,
                h as usize,
                m.max(0) as usize,
                name == "holt_winters_with_fit",
            )?))
        }
        other => Err(QueryError::UnsupportedExpression(format!(
            "undefined function {}()",
            other
        ))),
    }
}

/// `top(value, [tag...], N)` / `bottom(value, [tag...], N)`.
fn build_selector(
    name: &str,
    args: &[Expr],
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<Vec<(AnyIterator, Option<String>)>> {
    if args.len() < 2 {
        return Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!("expected at least 2 arguments, got {}", args.len()),
        });
    }
    let var = match args[0].unparenthesize() {
        Expr::VarRef(v) => v.clone(),
        other => {
            return Err(QueryError::InvalidArguments {
                call: name.into(),
                message: format!("first argument must be a field, got {}", other),
            })
        }
    };
    let n = integer_arg(name, args.last())?;
    if n < 1 {
        return Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!("limit must be at least 1, got {}", n),
        });
    }
    let tags: Vec<String> = args[1..args.len() - 1]
        .iter()
        .map(|arg| match arg.unparenthesize() {
            Expr::VarRef(v) => Ok(v.name.clone()),
            other => Err(QueryError::InvalidArguments {
                call: name.into(),
                message: format!("tag argument must be a reference, got {}", other),
            }),
        })
        .collect::<Result<_>>()?;

    let input = if tags.is_empty() {
        raw_field_iterator(&var, group, opt)?
    } else {
        // Rank per-tag aggregates: the shards compute the corresponding
        // reducer per (window × tag) group and carry the tag values in aux.
        let reducer = if name == "top" { "max" } else { "min" };
        let mut inner_opt = opt.clone();
        let typed = resolved_ref(group, opt, &var);
        inner_opt.expr = Some(Expr::Call {
            name: reducer.to_string(),
            args: vec![Expr::VarRef(typed)],
        });
        // Widen the reduction grouping with the carried tags; merge ordering
        // keeps the outer dimensions so windows stay contiguous for the
        // selector.
        inner_opt.fill = Fill::None;
        for tag in &tags {
            inner_opt.group_by.insert(tag.clone());
        }
        inner_opt.aux = tags
            .iter()
            .map(|t| VarRef::typed(t.clone(), DataType::Tag))
            .collect();

        let mut inputs = Vec::with_capacity(opt.sources.len());
        for source in &opt.sources {
            inputs.push(group.create_iterator(&source.name, &inner_opt)?);
        }
        Iterators(inputs).merge(&inner_opt)?
    };

    let selector = if name == "top" {
        new_top_iterator(input, opt, n as usize)?
    } else {
        new_bottom_iterator(input, opt, n as usize)?
    };

    if tags.is_empty() {
        return Ok(vec![(selector, None)]);
    }
    // The carried tags surface as extra string columns via the fan-out.
    let kind = selector.data_type();
    let mut fanout = AuxFanout::new(selector);
    let mut parts = vec![(fanout.output(AuxTarget::Primary, kind), None)];
    for (i, tag) in tags.iter().enumerate() {
        parts.push((
            fanout.output(AuxTarget::Cell(i), DataType::String),
            Some(tag.clone()),
        ));
    }
    Ok(parts)
}

/// A binary projection over aggregates: each side builds independently and
/// the two co-ordered streams zip. A literal side folds into the operator.
fn build_call_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    let side = |expr: &Expr, group: &mut dyn ShardGroup| -> Result<(AnyIterator, DataType)> {
        match expr.unparenthesize() {
            Expr::Call { name, args } => {
                let mut parts = build_call(name, args, group, opt)?;
                if parts.len() != 1 {
                    return Err(QueryError::UnsupportedExpression(
                        "selector with tags cannot be an operand".into(),
                    ));
                }
                let (it, _) = parts.remove(0);
                let kind = it.data_type();
                Ok((it, kind))
            }
            other => Err(QueryError::UnsupportedExpression(other.to_string())),
        }
    };

    match (lhs.unparenthesize(), rhs.unparenthesize()) {
        (Expr::Literal(lit), call_side) => {
            let (it, kind) = side(call_side, group)?;
            let (operand, lit_type) = literal_operand(lit)?;
            let out = binary_expr_type(op, lit_type, kind)?;
            new_binary_aux_iterator(it, op, operand, Operand::Value, out)
        }
        (call_side, Expr::Literal(lit)) => {
            let (it, kind) = side(call_side, group)?;
            let (operand, lit_type) = literal_operand(lit)?;
            let out = binary_expr_type(op, kind, lit_type)?;
            new_binary_aux_iterator(it, op, Operand::Value, operand, out)
        }
        (l, r) => {
            let (mut left_it, left_type) = side(l, group)?;
            let (right_it, right_type) = match side(r, group) {
                Ok(x) => x,
                Err(e) => {
                    left_it.close();
                    return Err(e);
                }
            };
            let out = binary_expr_type(op, left_type, right_type)?;
            new_binary_join_iterator(left_it, right_it, op, opt, out)
        }
    }
}

/// Input for a transform: either the raw field stream or a full aggregate
/// stack when the argument is itself a call.
fn transform_input(
    name: &str,
    args: &[Expr],
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    match args.first().map(|e| e.unparenthesize()) {
        Some(Expr::VarRef(v)) => raw_field_iterator(v, group, opt),
        Some(Expr::Call {
            name: inner_name,
            args: inner_args,
        }) => {
            let mut parts = build_call(inner_name, inner_args, group, opt)?;
            if parts.len() != 1 {
                return Err(QueryError::InvalidArguments {
                    call: name.into(),
                    message: "argument must be a single aggregate".into(),
                });
            }
            Ok(parts.remove(0).0)
        }
        _ => Err(QueryError::InvalidArguments {
            call: name.into(),
            message: "first argument must be a field or aggregate".into(),
        }),
    }
}

// ============================================================================
// Shared plumbing
// ============================================================================

/// Shard-pushdown aggregate: the shards pre-reduce per shard, the merge
/// combines the partials.
fn shard_call_iterator(
    name: &str,
    var: &VarRef,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    let typed = resolved_ref(group, opt, var);
    let mut shard_opt = opt.clone();
    shard_opt.expr = Some(Expr::Call {
        name: name.to_string(),
        args: vec![Expr::VarRef(typed)],
    });
    let mut inputs = Vec::with_capacity(opt.sources.len());
    for source in &opt.sources {
        inputs.push(group.create_iterator(&source.name, &shard_opt)?);
    }
    Iterators(inputs).merge(&shard_opt)
}

/// The sorted raw stream of one field, merged across sources.
fn raw_field_iterator(
    var: &VarRef,
    group: &mut dyn ShardGroup,
    opt: &IteratorOptions,
) -> Result<AnyIterator> {
    let typed = resolved_ref(group, opt, var);
    let mut shard_opt = opt.clone();
    shard_opt.expr = Some(Expr::VarRef(typed));
    let mut inputs = Vec::with_capacity(opt.sources.len());
    for source in &opt.sources {
        inputs.push(group.create_iterator(&source.name, &shard_opt)?);
    }
    Iterators(inputs).merge(&shard_opt)
}

fn resolved_ref(group: &dyn ShardGroup, opt: &IteratorOptions, var: &VarRef) -> VarRef {
    VarRef {
        name: var.name.clone(),
        data_type: resolve_type(group, &opt.sources, &var.name, var.data_type),
    }
}

fn resolve_type(
    group: &dyn ShardGroup,
    sources: &[crate::ast::Measurement],
    name: &str,
    hint: DataType,
) -> DataType {
    for source in sources {
        let t = group.map_type(&source.name, name);
        if t != DataType::Unknown {
            return t;
        }
    }
    hint
}

fn call_field_arg(name: &str, args: &[Expr], min: usize, max: usize) -> Result<VarRef> {
    if args.len() < min || args.len() > max {
        return Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!("expected {} argument(s), got {}", max, args.len()),
        });
    }
    match args[0].unparenthesize() {
        Expr::VarRef(v) => Ok(v.clone()),
        other => Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!("first argument must be a field, got {}", other),
        }),
    }
}

fn literal_operand(lit: &Literal) -> Result<(Operand, DataType)> {
    match lit {
        Literal::Integer(v) => Ok((Operand::Integer(*v), DataType::Integer)),
        Literal::Float(v) => Ok((Operand::Float(*v), DataType::Float)),
        Literal::Boolean(v) => Ok((Operand::Boolean(*v), DataType::Boolean)),
        other => Err(QueryError::UnsupportedExpression(other.to_string())),
    }
}

fn integer_arg(name: &str, arg: Option<&Expr>) -> Result<i64> {
    match arg.map(|e| e.unparenthesize()) {
        Some(Expr::Literal(Literal::Integer(v))) => Ok(*v),
        other => Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!(
                "expected an integer literal, got {}",
                other.map(|e| e.to_string()).unwrap_or_else(|| "nothing".into())
            ),
        }),
    }
}

fn number_arg(name: &str, arg: Option<&Expr>) -> Result<f64> {
    match arg.map(|e| e.unparenthesize()) {
        Some(Expr::Literal(Literal::Integer(v))) => Ok(*v as f64),
        Some(Expr::Literal(Literal::Float(v))) => Ok(*v),
        other => Err(QueryError::InvalidArguments {
            call: name.into(),
            message: format!(
                "expected a numeric literal, got {}",
                other.map(|e| e.to_string()).unwrap_or_else(|| "nothing".into())
            ),
        }),
    }
}

fn duration_arg(arg: Option<&Expr>, default: i64) -> Result<i64> {
    match arg.map(|e| e.unparenthesize()) {
        None => Ok(default),
        Some(Expr::Literal(Literal::Duration(v))) if *v > 0 => Ok(*v),
        Some(Expr::Literal(Literal::Integer(v))) if *v > 0 => Ok(*v),
        Some(other) => Err(QueryError::InvalidArguments {
            call: "duration".into(),
            message: format!("expected a positive duration, got {}", other),
        }),
    }
}
