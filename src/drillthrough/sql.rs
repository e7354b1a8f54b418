//! Drillability and drill-through SQL of one cell.
//!
//! A cell is drillable when every member of its coordinate is stored, or
//! is a calculated member that is trivially equivalent to stored data:
//!
//! - an identifier naming one stored member, or `Aggregate({m})`;
//! - on `Measures`, scalar arithmetic or `IIf` over literals and stored
//!   measures of a single base cube.
//!
//! The SQL is a star join over the base cube's fact table with one column
//! per level of each coordinate member (outer levels first), then one
//! column per measure. Parent-child members match their own key only.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::alias::AliasAllocator;
use super::DrillThroughError;
use crate::mdx::{BinaryOp, Expr as MdxExpr};
use crate::olap::context::Context;
use crate::olap::eval::{Datum, Evaluator, QueryState};
use crate::olap::member::{HierarchyMembers, MemberRef};
use crate::olap::star::{Scope, StarQuery};
use crate::olap::{EvalResult, OlapResult};
use crate::schema::{CubeId, HierarchyId, MEASURES_HIERARCHY};
use crate::sql::{
    col, count_star, lit_null, star, Expr, ExprExt, OrderByExpr, SelectExpr, SqlDialect,
};

/// What a drillable cell reads.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DrillTarget {
    pub base: CubeId,
    /// Stored member per hierarchy; measures excluded.
    pub members: Vec<(HierarchyId, usize)>,
    /// Stored measures the cell depends on, by position in the query cube.
    pub measures: Vec<usize>,
}

/// A field of a `DRILLTHROUGH ... RETURN` list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ReturnField {
    Level(HierarchyId, usize),
    Measure(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Level,
    Measure,
    /// A RETURN field the base cube cannot supply.
    Null,
}

struct Column {
    expr: Expr,
    kind: ColumnKind,
    alias: String,
}

impl Column {
    fn new(expr: Option<Expr>, kind: ColumnKind, alias: String) -> Self {
        match expr {
            Some(expr) => Self { expr, kind, alias },
            None => Self {
                expr: lit_null(),
                kind: ColumnKind::Null,
                alias,
            },
        }
    }
}

/// Caption columns of levels `0..=upto` of `h`.
fn level_columns(
    star_query: &mut StarQuery<'_>,
    aliases: &mut AliasAllocator,
    columns: &mut Vec<Column>,
    h: HierarchyId,
    upto: usize,
) {
    let hierarchy = star_query.schema().hierarchy(h);
    for level in hierarchy.levels.iter().take(upto + 1) {
        let expr = star_query.column(h, level.caption_column());
        if expr.is_some() {
            columns.push(Column::new(expr, ColumnKind::Level, aliases.allocate(&level.name)));
        }
    }
}

pub(crate) struct DrillQuery {
    pub sql: String,
    pub count_sql: String,
    pub columns: Vec<String>,
}

/// A calculated member reduced to stored data.
enum Trivial {
    Member(MemberRef),
    /// A scalar over these stored measures; none for a constant.
    Scalar(Vec<usize>),
}

fn analyze(ev: &Evaluator<'_>, expr: &MdxExpr, visiting: &mut Vec<usize>) -> Option<Trivial> {
    match expr {
        MdxExpr::Number(_) | MdxExpr::Str(_) => Some(Trivial::Scalar(Vec::new())),
        MdxExpr::Id(id) => match ev.resolve(id).ok()? {
            Datum::Member(m @ (MemberRef::Stored { .. } | MemberRef::Measure(_))) => {
                Some(Trivial::Member(m))
            }
            Datum::Member(MemberRef::Calculated { index, .. }) => {
                if visiting.contains(&index) {
                    return None;
                }
                visiting.push(index);
                let result = analyze(ev, &ev.q.calcs[index].formula, visiting);
                visiting.pop();
                result
            }
            _ => None,
        },
        MdxExpr::Call { name, args } if name.eq_ignore_ascii_case("aggregate") => {
            let inner = match args.as_slice() {
                [MdxExpr::Set(items)] if items.len() == 1 => &items[0],
                [single @ MdxExpr::Id(_)] => single,
                _ => return None,
            };
            match analyze(ev, inner, visiting)? {
                Trivial::Member(m) => Some(Trivial::Member(m)),
                Trivial::Scalar(_) => None,
            }
        }
        MdxExpr::Call { name, args } if name.eq_ignore_ascii_case("iif") => {
            scalar_over(ev, args.iter(), visiting)
        }
        MdxExpr::Binary { op, lhs, rhs } if *op != BinaryOp::Range => {
            scalar_over(ev, [lhs.as_ref(), rhs.as_ref()].into_iter(), visiting)
        }
        MdxExpr::Unary { expr, .. } => scalar_over(ev, std::iter::once(expr.as_ref()), visiting),
        _ => None,
    }
}

/// The stored measures of a scalar expression over `parts`.
fn scalar_over<'e>(
    ev: &Evaluator<'_>,
    parts: impl Iterator<Item = &'e MdxExpr>,
    visiting: &mut Vec<usize>,
) -> Option<Trivial> {
    let mut measures = Vec::new();
    for part in parts {
        match analyze(ev, part, visiting)? {
            Trivial::Member(MemberRef::Measure(i)) => measures.push(i),
            Trivial::Member(_) => return None,
            Trivial::Scalar(inner) => measures.extend(inner),
        }
    }
    Some(Trivial::Scalar(measures))
}

/// The stored data behind a cell, `None` if the cell is not drillable.
pub(crate) fn target(ev: &Evaluator<'_>, ctx: &Context) -> EvalResult<Option<DrillTarget>> {
    let schema = ev.schema();
    let cube = ev.cube();
    let mut members = Vec::new();
    let mut measures = Vec::new();

    if ctx
        .compound()
        .iter()
        .any(|list| list.covers(MEASURES_HIERARCHY) || list.tuples.iter().flatten().any(|m| m.is_calculated()))
    {
        return Ok(None);
    }

    for h in schema.cube_hierarchies(cube) {
        if ctx.is_compound(h) {
            continue;
        }
        let member = match ev.current_member(h, ctx)? {
            MemberRef::Calculated { index, .. } => {
                match analyze(ev, &ev.q.calcs[index].formula, &mut vec![index]) {
                    Some(Trivial::Member(m)) if m.hierarchy() == h => m,
                    Some(Trivial::Scalar(ms)) if h == MEASURES_HIERARCHY => {
                        measures.extend(ms);
                        continue;
                    }
                    _ => return Ok(None),
                }
            }
            m => m,
        };
        match member {
            MemberRef::Measure(i) => measures.push(i),
            MemberRef::Stored { index, .. } => members.push((h, index)),
            MemberRef::Null(_) => return Ok(None),
            MemberRef::Calculated { .. } => return Ok(None),
        }
    }

    let mut bases: Vec<CubeId> = Vec::new();
    for i in &measures {
        let base = cube.measures[*i].base_cube;
        if !bases.contains(&base) {
            bases.push(base);
        }
    }
    let base = match bases.as_slice() {
        [] => match cube.base_cubes().first() {
            Some(base) => *base,
            None => return Ok(None),
        },
        [base] => *base,
        _ => return Ok(None),
    };
    let mut distinct = Vec::with_capacity(measures.len());
    for i in measures {
        if !distinct.contains(&i) {
            distinct.push(i);
        }
    }
    let measures = distinct;
    Ok(Some(DrillTarget {
        base,
        members,
        measures,
    }))
}

pub(crate) fn is_drillable(state: &QueryState, ctx: &Context) -> bool {
    let ev = Evaluator::new(state);
    matches!(target(&ev, ctx), Ok(Some(_)))
}

fn ensure_enabled(state: &QueryState) -> Result<(), DrillThroughError> {
    if state.shared.settings.drillthrough.enabled {
        Ok(())
    } else {
        Err(DrillThroughError::Disabled)
    }
}

pub(crate) fn cell_sql(
    state: &QueryState,
    ctx: &Context,
    order: &[HierarchyId],
    extended_context: bool,
) -> OlapResult<Option<String>> {
    ensure_enabled(state)?;
    let ev = Evaluator::new(state);
    let Some(target) = target(&ev, ctx)? else {
        return Ok(None);
    };
    Ok(Some(build(&ev, ctx, &target, order, extended_context, None)?.sql))
}

/// Runs `SELECT COUNT(*)` over the cell's drill-through rows.
pub(crate) fn cell_count(
    state: &QueryState,
    ctx: &Context,
    order: &[HierarchyId],
) -> OlapResult<Option<u64>> {
    ensure_enabled(state)?;
    let ev = Evaluator::new(state);
    let Some(target) = target(&ev, ctx)? else {
        return Ok(None);
    };
    let query = build(&ev, ctx, &target, order, false, None)?;
    let result = state.shared.connection.execute_query(&query.count_sql, None)?;
    let count = result
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    Ok(Some(count as u64))
}

/// Build the drill-through query. `returns` replaces the default column
/// list.
pub(crate) fn build(
    ev: &Evaluator<'_>,
    ctx: &Context,
    target: &DrillTarget,
    order: &[HierarchyId],
    extended_context: bool,
    returns: Option<&[ReturnField]>,
) -> OlapResult<DrillQuery> {
    let schema = ev.schema();
    let cube = ev.cube();
    let shared = &ev.q.shared;
    let dialect = &shared.dialect;
    let base = schema.cube_by_id(target.base);
    let mut star_query = StarQuery::new(schema, dialect, base).ok_or_else(|| {
        DrillThroughError::NotDrillable(format!("cube '{}' has no fact table", base.name))
    })?;

    // Constraints.
    let mut levels: HashMap<HierarchyId, usize> = HashMap::new();
    for (h, index) in &target.members {
        let members = ev.q.members(*h)?;
        if schema.joins(target.base, *h).is_none() {
            continue;
        }
        if let Some(level) = members.member(*index).level {
            star_query.constrain_member(&members, *index, Scope::Own);
            levels.insert(*h, level);
        }
    }
    for list in ctx.compound() {
        if list.hierarchies.iter().any(|h| schema.joins(target.base, *h).is_none()) {
            continue;
        }
        let mut lists = Vec::with_capacity(list.hierarchies.len());
        for h in &list.hierarchies {
            lists.push(ev.q.members(*h)?);
        }
        let index_of = |m: &MemberRef| match m {
            MemberRef::Stored { index, .. } => Some(*index),
            _ => None,
        };
        match list.crossjoin_factors() {
            Some(factors) => {
                for (members, factor) in lists.iter().zip(&factors) {
                    let indices: Vec<usize> = factor.iter().filter_map(index_of).collect();
                    star_query.constrain_members(members, &indices, Scope::Own);
                }
            }
            None => {
                let tuples: Vec<Vec<(&HierarchyMembers, usize)>> = list
                    .tuples
                    .iter()
                    .map(|t| {
                        lists
                            .iter()
                            .map(Arc::as_ref)
                            .zip(t.iter().filter_map(index_of))
                            .collect()
                    })
                    .collect();
                star_query.constrain_tuples(&tuples, Scope::Own);
            }
        }
        for (h, members) in list.hierarchies.iter().zip(&lists) {
            let deepest = list
                .tuples
                .iter()
                .flatten()
                .filter(|m| m.hierarchy() == *h)
                .filter_map(index_of)
                .filter_map(|i| members.member(i).level)
                .max();
            if let Some(level) = deepest {
                levels.insert(*h, level);
            }
        }
    }

    // Columns.
    let mut aliases = AliasAllocator::new(dialect.max_column_name_length());
    let mut columns: Vec<Column> = Vec::new();
    match returns {
        Some(fields) => {
            for field in fields {
                match *field {
                    ReturnField::Level(h, l) => {
                        let level = &schema.hierarchy(h).levels[l];
                        let expr = schema
                            .joins(target.base, h)
                            .and_then(|_| star_query.column(h, level.caption_column()));
                        columns.push(Column::new(expr, ColumnKind::Level, aliases.allocate(&level.name)));
                    }
                    ReturnField::Measure(i) => {
                        let measure = &cube.measures[i];
                        let expr = (measure.base_cube == target.base)
                            .then(|| star_query.measure_column(measure))
                            .flatten();
                        columns.push(Column::new(expr, ColumnKind::Measure, aliases.allocate(&measure.name)));
                    }
                }
            }
        }
        None => {
            let mut included = Vec::new();
            let constrained = target.members.iter().map(|(h, _)| *h);
            let compound = ctx.compound().iter().flat_map(|l| l.hierarchies.iter().copied());
            for h in order.iter().copied().chain(constrained).chain(compound) {
                if h == MEASURES_HIERARCHY || included.contains(&h) {
                    continue;
                }
                if let Some(level) = levels.get(&h) {
                    level_columns(&mut star_query, &mut aliases, &mut columns, h, *level);
                    included.push(h);
                }
            }
            if extended_context {
                for h in schema.cube_hierarchies(cube).into_iter().skip(1) {
                    if included.contains(&h) || schema.joins(target.base, h).is_none() {
                        continue;
                    }
                    let depth = schema.hierarchy(h).levels.len();
                    if depth > 0 {
                        level_columns(&mut star_query, &mut aliases, &mut columns, h, depth - 1);
                    }
                    included.push(h);
                }
            }
            for i in &target.measures {
                let measure = &cube.measures[*i];
                if let Some(expr) = star_query.measure_column(measure) {
                    columns.push(Column::new(Some(expr), ColumnKind::Measure, aliases.allocate(&measure.name)));
                }
            }
        }
    }

    let order_by: Vec<OrderByExpr> = columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Level)
        .map(|c| {
            if dialect.requires_order_by_alias() {
                OrderByExpr::asc(col(&c.alias))
            } else {
                OrderByExpr::asc(c.expr.clone())
            }
        })
        .collect();
    let names: Vec<String> = columns.iter().map(|c| c.alias.clone()).collect();
    let select: Vec<SelectExpr> = if columns.is_empty() {
        vec![SelectExpr::new(star())]
    } else {
        columns.into_iter().map(|c| c.expr.alias(&c.alias)).collect()
    };

    let mut query = star_query.query().select(select);
    if !order_by.is_empty() {
        query = query.order_by(order_by);
    }
    let sql = query.to_sql(dialect);
    let count_sql = star_query.query().select(vec![count_star()]).to_sql(dialect);
    debug!(sql = %sql, "drill-through query");
    Ok(DrillQuery {
        sql,
        count_sql,
        columns: names,
    })
}
