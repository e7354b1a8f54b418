//! Cell evaluation.
//!
//! The evaluator computes the value of a coordinate ([`Context`]):
//!
//! 1. A null member anywhere makes the cell empty.
//! 2. Otherwise the calculated member with the highest solve order wins
//!    (ties go to the earlier hierarchy, so `Measures` first) and its
//!    formula is evaluated in the same context.
//! 3. Otherwise the value is read from an aggregation segment, loaded
//!    through the session's cache with a star-join query.
//!
//! Calculated members are tracked on an explicit stack; evaluating the
//! same member at an identical context again is a cycle.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::context::{Context, TupleList};
use super::member::{HierarchyMembers, MemberRef, Tuple};
use super::session::Shared;
use super::star::{Scope, StarQuery};
use super::value::CellValue;
use super::{EvalError, EvalResult};
use crate::cache::{GroupSpec, Predicate, Segment, SegmentKey};
use crate::connection::ConnectionError;
use crate::mdx::{self, BinaryOp, UnaryOp, WithClause};
use crate::schema::{Aggregator, Cube, CubeId, HierarchyId, Measure, Schema, MEASURES_HIERARCHY};
use crate::sql::{ExprExt, SelectExpr};

/// A calculated member visible to one query: defined on the cube or in a
/// `WITH MEMBER` clause.
#[derive(Debug, Clone)]
pub(crate) struct CalcMember {
    pub name: String,
    pub unique_name: String,
    pub hierarchy: HierarchyId,
    pub parent: Option<MemberRef>,
    pub formula: mdx::Expr,
    pub format_string: Option<String>,
    pub solve_order: i32,
}

/// Everything a query needs after parsing: its cube and the calculated
/// members and named sets in scope.
pub(crate) struct QueryState {
    pub shared: Arc<Shared>,
    pub cube: CubeId,
    pub calcs: Vec<CalcMember>,
    pub sets: Vec<(String, mdx::Expr)>,
}

impl QueryState {
    pub fn new(shared: Arc<Shared>, cube_name: &str, with: &[WithClause]) -> EvalResult<Self> {
        let cube = shared
            .schema
            .cube(cube_name)
            .ok_or_else(|| EvalError::CubeNotFound(cube_name.to_string()))?;
        let cube_id = cube.id;
        let calcs = cube
            .calculated_members
            .iter()
            .map(|c| CalcMember {
                name: c.name.clone(),
                unique_name: c.unique_name.clone(),
                hierarchy: c.hierarchy,
                parent: None,
                formula: c.formula.clone(),
                format_string: c.format_string.clone(),
                solve_order: c.solve_order,
            })
            .collect();
        let mut state = Self {
            cube: cube_id,
            shared,
            calcs,
            sets: Vec::new(),
        };

        for clause in with {
            match clause {
                WithClause::Member {
                    name,
                    expr,
                    format_string,
                    solve_order,
                } => {
                    let (hierarchy, parent, member_name) = Evaluator::new(&state).calc_target(name)?;
                    let unique_name = {
                        let ev = Evaluator::new(&state);
                        let prefix = match parent {
                            Some(p) => ev.unique_name(p)?,
                            None => state.schema().hierarchy(hierarchy).unique_name.clone(),
                        };
                        format!("{prefix}.[{member_name}]")
                    };
                    let calc = CalcMember {
                        name: member_name,
                        unique_name,
                        hierarchy,
                        parent,
                        formula: expr.clone(),
                        format_string: format_string.clone(),
                        solve_order: *solve_order,
                    };
                    match state
                        .calcs
                        .iter()
                        .position(|c| c.unique_name.eq_ignore_ascii_case(&calc.unique_name))
                    {
                        Some(i) => state.calcs[i] = calc,
                        None => state.calcs.push(calc),
                    }
                }
                WithClause::Set { name, expr } => {
                    let name = name.last_name().unwrap_or_default().to_string();
                    state.sets.push((name, expr.clone()));
                }
            }
        }
        Ok(state)
    }

    pub fn schema(&self) -> &Schema {
        &self.shared.schema
    }

    pub fn cube(&self) -> &Cube {
        self.shared.schema.cube_by_id(self.cube)
    }

    pub fn members(&self, hierarchy: HierarchyId) -> EvalResult<Arc<HierarchyMembers>> {
        Ok(self.shared.reader.members(hierarchy)?)
    }
}

/// The result of evaluating an MDX expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Datum {
    Value(CellValue),
    Member(MemberRef),
    Tuple(Tuple),
    Set(Vec<Tuple>),
    Level(HierarchyId, usize),
    Hierarchy(HierarchyId),
}

/// Format information of a cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CellFormat {
    pub format_string: Option<String>,
    pub formatter: Option<String>,
}

/// Evaluates expressions and cells of one query. Not shared across
/// threads.
pub(crate) struct Evaluator<'q> {
    pub q: &'q QueryState,
    /// Calculated members being evaluated, with their contexts.
    pub(super) stack: RefCell<Vec<(usize, Context)>>,
    pub(super) named_sets: RefCell<HashMap<String, Vec<Tuple>>>,
}

impl<'q> Evaluator<'q> {
    pub fn new(q: &'q QueryState) -> Self {
        Self {
            q,
            stack: RefCell::new(Vec::new()),
            named_sets: RefCell::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &'q Schema {
        self.q.schema()
    }

    pub fn cube(&self) -> &'q Cube {
        self.q.cube()
    }

    pub fn not_found(&self, name: impl ToString) -> EvalError {
        EvalError::MemberNotFound {
            name: name.to_string(),
            cube: self.cube().name.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn eval(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<Datum> {
        match expr {
            mdx::Expr::Id(id) => self.resolve(id),
            mdx::Expr::Number(n) => Ok(Datum::Value(CellValue::Number(*n))),
            mdx::Expr::Str(s) => Ok(Datum::Value(CellValue::Text(s.clone()))),
            mdx::Expr::Empty => Ok(Datum::Value(CellValue::Empty)),
            mdx::Expr::Call { name, args } => self.call(name, args, ctx),
            mdx::Expr::Method { target, name, args } => self.method(target, name, args, ctx),
            mdx::Expr::Set(items) => {
                let mut tuples = Vec::new();
                for item in items {
                    for tuple in self.eval_set(item, ctx)? {
                        if !tuple.iter().any(|m| matches!(m, MemberRef::Null(_))) {
                            tuples.push(tuple);
                        }
                    }
                }
                Ok(Datum::Set(tuples))
            }
            mdx::Expr::Tuple(items) => {
                let mut tuple = Vec::with_capacity(items.len());
                for item in items {
                    match self.eval(item, ctx)? {
                        Datum::Tuple(inner) => tuple.extend(inner),
                        other => tuple.push(self.to_member(other, ctx)?),
                    }
                }
                Ok(Datum::Tuple(tuple))
            }
            mdx::Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, ctx),
            mdx::Expr::Unary { op, expr } => {
                let value = self.eval_scalar(expr, ctx)?;
                Ok(Datum::Value(match op {
                    UnaryOp::Neg => match value {
                        CellValue::Error(_) | CellValue::Empty => value,
                        v => v
                            .as_f64()
                            .map(|n| CellValue::Number(-n))
                            .unwrap_or(CellValue::Empty),
                    },
                    UnaryOp::Not => CellValue::Bool(!value.is_true()),
                }))
            }
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &mdx::Expr,
        rhs: &mdx::Expr,
        ctx: &Context,
    ) -> EvalResult<Datum> {
        match op {
            BinaryOp::Range => {
                let from = self.eval_member(lhs, ctx)?;
                let to = self.eval_member(rhs, ctx)?;
                Ok(Datum::Set(
                    self.range(from, to)?.into_iter().map(|m| vec![m]).collect(),
                ))
            }
            BinaryOp::Mul => {
                let left = self.eval(lhs, ctx)?;
                if matches!(left, Datum::Set(_)) {
                    let left = self.to_set(left, ctx)?;
                    let right = self.eval_set(rhs, ctx)?;
                    return Ok(Datum::Set(crossjoin(&left, &right)));
                }
                let right = self.eval(rhs, ctx)?;
                if matches!(right, Datum::Set(_)) {
                    let left = self.to_set(left, ctx)?;
                    let right = self.to_set(right, ctx)?;
                    return Ok(Datum::Set(crossjoin(&left, &right)));
                }
                let l = self.value_of(left, ctx)?;
                let r = self.value_of(right, ctx)?;
                Ok(Datum::Value(arithmetic(op, l, r)))
            }
            BinaryOp::And => {
                let l = self.eval_scalar(lhs, ctx)?.is_true();
                Ok(Datum::Value(CellValue::Bool(
                    l && self.eval_scalar(rhs, ctx)?.is_true(),
                )))
            }
            BinaryOp::Or => {
                let l = self.eval_scalar(lhs, ctx)?.is_true();
                Ok(Datum::Value(CellValue::Bool(
                    l || self.eval_scalar(rhs, ctx)?.is_true(),
                )))
            }
            op if op.is_arithmetic() => {
                let l = self.eval_scalar(lhs, ctx)?;
                let r = self.eval_scalar(rhs, ctx)?;
                Ok(Datum::Value(arithmetic(op, l, r)))
            }
            op => {
                let l = self.eval_scalar(lhs, ctx)?;
                let r = self.eval_scalar(rhs, ctx)?;
                if let CellValue::Error(_) = l {
                    return Ok(Datum::Value(l));
                }
                if let CellValue::Error(_) = r {
                    return Ok(Datum::Value(r));
                }
                let ordering = compare_values(&l, &r);
                let result = match op {
                    BinaryOp::Eq => ordering == Ordering::Equal,
                    BinaryOp::Ne => ordering != Ordering::Equal,
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(Datum::Value(CellValue::Bool(result)))
            }
        }
    }

    pub fn eval_scalar(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<CellValue> {
        let datum = self.eval(expr, ctx)?;
        self.value_of(datum, ctx)
    }

    pub fn eval_set(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<Vec<Tuple>> {
        let datum = self.eval(expr, ctx)?;
        self.to_set(datum, ctx)
    }

    pub fn eval_member(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<MemberRef> {
        let datum = self.eval(expr, ctx)?;
        self.to_member(datum, ctx)
    }

    pub fn eval_level(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<(HierarchyId, usize)> {
        match self.eval(expr, ctx)? {
            Datum::Level(h, l) => Ok((h, l)),
            _ => Err(EvalError::Type(format!("'{expr}' is not a level"))),
        }
    }

    pub fn eval_int(&self, expr: &mdx::Expr, ctx: &Context) -> EvalResult<i64> {
        self.eval_scalar(expr, ctx)?
            .as_f64()
            .map(|n| n as i64)
            .ok_or_else(|| EvalError::Type(format!("'{expr}' is not a number")))
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// Scalar value of a datum in `ctx`: members and tuples are cells.
    pub fn value_of(&self, datum: Datum, ctx: &Context) -> EvalResult<CellValue> {
        match datum {
            Datum::Value(v) => Ok(v),
            Datum::Member(m) => self.cell_value(&ctx.with(m)),
            Datum::Tuple(t) => self.cell_value(&ctx.with_tuple(&t)),
            Datum::Hierarchy(h) => {
                let current = self.current_member(h, ctx)?;
                self.cell_value(&ctx.with(current))
            }
            Datum::Set(mut tuples) => match tuples.len() {
                0 => Ok(CellValue::Empty),
                1 => {
                    let tuple = tuples.remove(0);
                    self.cell_value(&ctx.with_tuple(&tuple))
                }
                n => Err(EvalError::Type(format!(
                    "a set of {n} tuples cannot be used as a value"
                ))),
            },
            Datum::Level(h, l) => Err(EvalError::Type(format!(
                "level '{}' cannot be used as a value",
                self.schema().hierarchy(h).levels[l].unique_name
            ))),
        }
    }

    pub fn to_set(&self, datum: Datum, ctx: &Context) -> EvalResult<Vec<Tuple>> {
        match datum {
            Datum::Set(tuples) => Ok(tuples),
            Datum::Member(MemberRef::Null(_)) => Ok(Vec::new()),
            Datum::Member(m) => Ok(vec![vec![m]]),
            Datum::Tuple(t) => Ok(vec![t]),
            Datum::Hierarchy(h) => Ok(vec![vec![self.current_member(h, ctx)?]]),
            Datum::Level(h, l) => Ok(self
                .level_members(h, l)?
                .into_iter()
                .map(|m| vec![m])
                .collect()),
            Datum::Value(v) => Err(EvalError::Type(format!(
                "value '{v}' cannot be used as a set"
            ))),
        }
    }

    pub fn to_member(&self, datum: Datum, ctx: &Context) -> EvalResult<MemberRef> {
        match datum {
            Datum::Member(m) => Ok(m),
            Datum::Hierarchy(h) => self.current_member(h, ctx),
            Datum::Tuple(t) if t.len() == 1 => Ok(t[0]),
            Datum::Set(s) if s.len() == 1 && s[0].len() == 1 => Ok(s[0][0]),
            other => Err(EvalError::Type(format!(
                "expected a member, got {}",
                describe(&other)
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    pub fn default_member(&self, hierarchy: HierarchyId) -> EvalResult<MemberRef> {
        if hierarchy == MEASURES_HIERARCHY {
            return Ok(if self.cube().measures.is_empty() {
                MemberRef::Null(hierarchy)
            } else {
                MemberRef::Measure(0)
            });
        }
        let members = self.q.members(hierarchy)?;
        Ok(members
            .default_member()
            .map(|i| MemberRef::stored(hierarchy, i))
            .unwrap_or(MemberRef::Null(hierarchy)))
    }

    pub fn current_member(&self, hierarchy: HierarchyId, ctx: &Context) -> EvalResult<MemberRef> {
        match ctx.member(hierarchy) {
            Some(m) => Ok(m),
            None => self.default_member(hierarchy),
        }
    }

    pub fn name(&self, member: MemberRef) -> EvalResult<String> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => {
                self.q.members(hierarchy)?.member(index).name.clone()
            }
            MemberRef::Measure(i) => self.cube().measures[i].name.clone(),
            MemberRef::Calculated { index, .. } => self.q.calcs[index].name.clone(),
            MemberRef::Null(_) => String::new(),
        })
    }

    pub fn unique_name(&self, member: MemberRef) -> EvalResult<String> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => {
                self.q.members(hierarchy)?.member(index).unique_name.clone()
            }
            MemberRef::Measure(i) => self.cube().measures[i].unique_name.clone(),
            MemberRef::Calculated { index, .. } => self.q.calcs[index].unique_name.clone(),
            MemberRef::Null(h) => format!("{}.#null", self.schema().hierarchy(h).unique_name),
        })
    }

    /// Depth below the all member; measures are at depth 0.
    pub fn depth(&self, member: MemberRef) -> EvalResult<usize> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => self.q.members(hierarchy)?.member(index).depth,
            MemberRef::Measure(_) | MemberRef::Null(_) => 0,
            MemberRef::Calculated { index, .. } => match self.q.calcs[index].parent {
                Some(parent) => self.depth(parent)? + 1,
                None if self.q.calcs[index].hierarchy == MEASURES_HIERARCHY => 0,
                None => 1,
            },
        })
    }

    /// Level index of a member. The all member reports level 0.
    pub fn level_of(&self, member: MemberRef) -> EvalResult<usize> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => {
                self.q.members(hierarchy)?.member(index).level.unwrap_or(0)
            }
            MemberRef::Calculated { index, .. } => match self.q.calcs[index].parent {
                Some(parent) => self.level_of(parent)? + 1,
                None => 0,
            },
            MemberRef::Measure(_) | MemberRef::Null(_) => 0,
        })
    }

    pub fn parent(&self, member: MemberRef) -> EvalResult<MemberRef> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => self
                .q
                .members(hierarchy)?
                .member(index)
                .parent
                .map(|p| MemberRef::stored(hierarchy, p))
                .unwrap_or(MemberRef::Null(hierarchy)),
            MemberRef::Calculated { hierarchy, index } => match self.q.calcs[index].parent {
                Some(parent) => parent,
                None => {
                    let members = self.q.members(hierarchy)?;
                    members
                        .all()
                        .map(|a| MemberRef::stored(hierarchy, a))
                        .unwrap_or(MemberRef::Null(hierarchy))
                }
            },
            other => MemberRef::Null(other.hierarchy()),
        })
    }

    pub fn children(&self, member: MemberRef) -> EvalResult<Vec<MemberRef>> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => self
                .q
                .members(hierarchy)?
                .member(index)
                .children
                .iter()
                .map(|c| MemberRef::stored(hierarchy, *c))
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Stored members of a level in hierarchical order.
    pub fn level_members(&self, hierarchy: HierarchyId, level: usize) -> EvalResult<Vec<MemberRef>> {
        if hierarchy == MEASURES_HIERARCHY {
            return Ok(self.measures());
        }
        let members = self.q.members(hierarchy)?;
        Ok(members
            .level_members(level)
            .into_iter()
            .map(|i| MemberRef::stored(hierarchy, i))
            .collect())
    }

    /// Every stored member of a hierarchy in hierarchical order.
    pub fn hierarchy_members(&self, hierarchy: HierarchyId) -> EvalResult<Vec<MemberRef>> {
        if hierarchy == MEASURES_HIERARCHY {
            return Ok(self.measures());
        }
        let members = self.q.members(hierarchy)?;
        Ok((0..members.len())
            .map(|i| MemberRef::stored(hierarchy, i))
            .collect())
    }

    pub fn measures(&self) -> Vec<MemberRef> {
        (0..self.cube().measures.len())
            .map(MemberRef::Measure)
            .collect()
    }

    pub fn calculated_members(&self, hierarchy: HierarchyId) -> Vec<MemberRef> {
        self.q
            .calcs
            .iter()
            .enumerate()
            .filter(|(_, c)| c.hierarchy == hierarchy)
            .map(|(index, _)| MemberRef::Calculated { hierarchy, index })
            .collect()
    }

    /// `from : to`, both at the same depth of one hierarchy.
    fn range(&self, from: MemberRef, to: MemberRef) -> EvalResult<Vec<MemberRef>> {
        match (from, to) {
            (
                MemberRef::Stored {
                    hierarchy,
                    index: a,
                },
                MemberRef::Stored {
                    hierarchy: h2,
                    index: b,
                },
            ) if hierarchy == h2 => {
                let members = self.q.members(hierarchy)?;
                let depth = members.member(a).depth;
                if members.member(b).depth != depth {
                    return Err(EvalError::Type(format!(
                        "members '{}' and '{}' are not on the same level",
                        members.member(a).unique_name,
                        members.member(b).unique_name
                    )));
                }
                let peers = members.at_depth(depth);
                let pa = peers.iter().position(|i| *i == a).unwrap_or(0);
                let pb = peers.iter().position(|i| *i == b).unwrap_or(0);
                let (lo, hi) = if pa <= pb { (pa, pb) } else { (pb, pa) };
                Ok(peers[lo..=hi]
                    .iter()
                    .map(|i| MemberRef::stored(hierarchy, *i))
                    .collect())
            }
            (MemberRef::Measure(a), MemberRef::Measure(b)) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                Ok((lo..=hi).map(MemberRef::Measure).collect())
            }
            (MemberRef::Null(_), _) | (_, MemberRef::Null(_)) => Ok(Vec::new()),
            (a, b) if a == b => Ok(vec![a]),
            (a, b) => Err(EvalError::Type(format!(
                "cannot build a range from '{}' to '{}'",
                self.unique_name(a)?,
                self.unique_name(b)?
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------

    /// The calculated member deciding a cell, if any.
    pub fn winning_calc(&self, ctx: &Context) -> Option<usize> {
        ctx.members()
            .filter_map(|m| match m {
                MemberRef::Calculated { index, .. } => Some(index),
                _ => None,
            })
            .max_by(|a, b| {
                let (ca, cb) = (&self.q.calcs[*a], &self.q.calcs[*b]);
                ca.solve_order
                    .cmp(&cb.solve_order)
                    .then_with(|| cb.hierarchy.cmp(&ca.hierarchy))
            })
    }

    pub fn cell_value(&self, ctx: &Context) -> EvalResult<CellValue> {
        if ctx.members().any(|m| matches!(m, MemberRef::Null(_))) {
            return Ok(CellValue::Empty);
        }
        if let Some(index) = self.winning_calc(ctx) {
            return self.eval_calc(index, ctx);
        }
        if let Some(list) = ctx.compound().iter().find(|c| {
            c.covers(MEASURES_HIERARCHY)
                || c.tuples.iter().flatten().any(|m| m.is_calculated())
        }) {
            return self.expand_compound(list, ctx);
        }
        self.stored_value(ctx)
    }

    fn eval_calc(&self, index: usize, ctx: &Context) -> EvalResult<CellValue> {
        let calc = &self.q.calcs[index];
        {
            let stack = self.stack.borrow();
            if stack.iter().any(|(i, c)| *i == index && c == ctx) {
                let names = stack
                    .iter()
                    .map(|(i, _)| self.q.calcs[*i].unique_name.clone())
                    .chain(std::iter::once(calc.unique_name.clone()))
                    .collect();
                return Err(EvalError::Cycle {
                    member: calc.unique_name.clone(),
                    stack: names,
                });
            }
            let limit = self.q.shared.settings.query.max_eval_depth;
            if stack.len() >= limit {
                return Err(EvalError::TooDeep {
                    member: calc.unique_name.clone(),
                    depth: limit,
                });
            }
        }

        self.stack.borrow_mut().push((index, ctx.clone()));
        let result = self
            .eval(&calc.formula, ctx)
            .and_then(|datum| self.value_of(datum, ctx));
        self.stack.borrow_mut().pop();
        result
    }

    /// Roll up a compound coordinate tuple by tuple, for lists the
    /// aggregation query cannot express directly. Non-additive measures
    /// are read once over the stored members behind the list instead.
    fn expand_compound(&self, list: &TupleList, ctx: &Context) -> EvalResult<CellValue> {
        let aggregator = match self.current_member(MEASURES_HIERARCHY, ctx)? {
            MemberRef::Measure(i) => self.cube().measures[i].aggregator,
            _ => Aggregator::Sum,
        };
        if !aggregator.is_additive() && !list.covers(MEASURES_HIERARCHY) {
            return self.aggregate_stored(&list.tuples, ctx);
        }
        let mut values = Vec::with_capacity(list.tuples.len());
        for tuple in &list.tuples {
            values.push(self.cell_value(&ctx.with_tuple(tuple))?);
        }
        Ok(rollup(aggregator, &values))
    }

    /// The current measure over the union of `tuples`, as one aggregation.
    fn aggregate_stored(&self, tuples: &[Tuple], ctx: &Context) -> EvalResult<CellValue> {
        let stored = self.stored_tuples(tuples, ctx)?;
        match stored.len() {
            0 => Ok(CellValue::Empty),
            1 => self.cell_value(&ctx.with_tuple(&stored[0])),
            _ => self.cell_value(&ctx.with_compound(TupleList::new(stored))),
        }
    }

    /// `tuples` with every calculated member replaced by the stored
    /// members it stands for. Fails on a calculated member that is not an
    /// alias of stored members.
    pub(crate) fn stored_tuples(&self, tuples: &[Tuple], ctx: &Context) -> EvalResult<Vec<Tuple>> {
        let mut out = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut expanded: Vec<Tuple> = vec![Vec::with_capacity(tuple.len())];
            for member in tuple {
                let Some(members) = self.stored_members(*member, ctx, &mut Vec::new())? else {
                    let measure = self.current_member(MEASURES_HIERARCHY, ctx)?;
                    return Err(EvalError::NonAdditiveRollup {
                        measure: self.unique_name(measure)?,
                        member: self.unique_name(*member)?,
                    });
                };
                let singles: Vec<Tuple> = members.into_iter().map(|m| vec![m]).collect();
                expanded = crossjoin(&expanded, &singles);
            }
            for tuple in expanded {
                if !out.contains(&tuple) {
                    out.push(tuple);
                }
            }
        }
        Ok(out)
    }

    /// Stored members behind `member`: itself when stored, the target of
    /// a member alias, or the members of a one-argument `Aggregate`.
    /// A null member stands for nothing.
    fn stored_members(
        &self,
        member: MemberRef,
        ctx: &Context,
        visiting: &mut Vec<usize>,
    ) -> EvalResult<Option<Vec<MemberRef>>> {
        let index = match member {
            MemberRef::Stored { .. } => return Ok(Some(vec![member])),
            MemberRef::Null(_) => return Ok(Some(Vec::new())),
            MemberRef::Measure(_) => return Ok(None),
            MemberRef::Calculated { index, .. } => index,
        };
        if visiting.contains(&index) {
            return Ok(None);
        }
        let tuples = match &self.q.calcs[index].formula {
            mdx::Expr::Id(id) => match self.resolve(id)? {
                Datum::Member(m) => vec![vec![m]],
                _ => return Ok(None),
            },
            mdx::Expr::Call { name, args } if name.eq_ignore_ascii_case("aggregate") && args.len() == 1 => {
                self.eval_set(&args[0], ctx)?
            }
            _ => return Ok(None),
        };

        visiting.push(index);
        let mut out = Vec::new();
        let mut aliased = true;
        for tuple in tuples {
            let [inner] = tuple.as_slice() else {
                aliased = false;
                break;
            };
            if inner.hierarchy() != member.hierarchy() {
                aliased = false;
                break;
            }
            match self.stored_members(*inner, ctx, visiting)? {
                Some(members) => out.extend(members),
                None => {
                    aliased = false;
                    break;
                }
            }
        }
        visiting.pop();
        Ok(aliased.then_some(out))
    }

    fn stored_value(&self, ctx: &Context) -> EvalResult<CellValue> {
        let schema = self.schema();
        let cube = self.cube();
        let measure = match self.current_member(MEASURES_HIERARCHY, ctx)? {
            MemberRef::Measure(i) => &cube.measures[i],
            _ => return Ok(CellValue::Empty),
        };
        let base = measure.base_cube;

        let mut explicit: Vec<(Arc<HierarchyMembers>, usize)> = Vec::new();
        for h in schema.cube_hierarchies(cube).into_iter().skip(1) {
            if ctx.is_compound(h) {
                continue;
            }
            let member = match ctx.member(h) {
                Some(m) => m,
                None if schema.hierarchy(h).has_all => continue,
                None => self.default_member(h)?,
            };
            let index = match member {
                MemberRef::Stored { index, .. } => index,
                MemberRef::Null(_) => return Ok(CellValue::Empty),
                _ => continue,
            };
            let members = self.q.members(h)?;
            if members.member(index).is_all() {
                continue;
            }
            if schema.joins(base, h).is_none() {
                return Ok(CellValue::Empty);
            }
            explicit.push((members, index));
        }

        let mut compounds = Vec::new();
        for list in ctx.compound() {
            match self.compound_part(list, base)? {
                Some(part) => compounds.push(part),
                None => return Ok(CellValue::Empty),
            }
        }

        // Group by the level of the last regular member, so its siblings
        // share one segment.
        let group = explicit.iter().rposition(|(members, index)| {
            let level = members.member(*index).level.unwrap_or(0);
            !schema.hierarchy(members.hierarchy).levels[level].is_parent_child()
        });

        let mut key = SegmentKey::new(base, &measure.name);
        for (i, (members, index)) in explicit.iter().enumerate() {
            if Some(i) == group {
                let member = members.member(*index);
                key = key.with_group(GroupSpec {
                    hierarchy: members.hierarchy,
                    level: member.level.unwrap_or(0),
                    parent: real_parent(members, *index)
                        .map(|p| members.key_path(p))
                        .unwrap_or_default(),
                });
            } else {
                key = key.with_predicate(Predicate::members(
                    members.hierarchy,
                    vec![members.key_path(*index)],
                ));
            }
        }
        for predicate in compounds.iter().flat_map(CompoundPart::predicates) {
            key = key.with_predicate(predicate);
        }

        let segment = self.q.shared.cache.get_or_load(&key, || {
            self.load_segment(measure, &explicit, group, &compounds)
        })?;

        let value = match group {
            Some(i) => {
                let (members, index) = &explicit[i];
                segment.value(&members.member(*index).key)
            }
            None => segment.value(&[]),
        };
        let counts = matches!(measure.aggregator, Aggregator::Count | Aggregator::DistinctCount);
        Ok(match value {
            CellValue::Number(n) if counts && group.is_none() && n == 0.0 => CellValue::Empty,
            v => v,
        })
    }

    fn compound_part(&self, list: &TupleList, base: CubeId) -> EvalResult<Option<CompoundPart>> {
        let schema = self.schema();
        let mut arenas = Vec::with_capacity(list.hierarchies.len());
        for h in &list.hierarchies {
            arenas.push(self.q.members(*h)?);
        }
        let tuples: Vec<Tuple> = list
            .tuples
            .iter()
            .filter(|t| {
                t.iter().all(|m| match m {
                    MemberRef::Stored { hierarchy, index } => {
                        let position = list.hierarchies.iter().position(|h| h == hierarchy);
                        let is_all = position
                            .map(|p| arenas[p].member(*index).is_all())
                            .unwrap_or(true);
                        is_all || schema.joins(base, *hierarchy).is_some()
                    }
                    _ => false,
                })
            })
            .cloned()
            .collect();
        if tuples.is_empty() {
            return Ok(None);
        }
        let index_of = |m: &MemberRef| match m {
            MemberRef::Stored { index, .. } => *index,
            _ => 0,
        };
        let filtered = TupleList::new(tuples);
        let factors = filtered
            .crossjoin_factors()
            .map(|f| f.iter().map(|ms| ms.iter().map(index_of).collect()).collect());
        let rows = filtered
            .tuples
            .iter()
            .map(|t| t.iter().map(index_of).collect())
            .collect();
        Ok(Some(CompoundPart {
            arenas,
            rows,
            factors,
        }))
    }

    fn load_segment(
        &self,
        measure: &Measure,
        explicit: &[(Arc<HierarchyMembers>, usize)],
        group: Option<usize>,
        compounds: &[CompoundPart],
    ) -> Result<Segment, ConnectionError> {
        let schema = self.schema();
        let shared = &self.q.shared;
        let base = schema.cube_by_id(measure.base_cube);
        let Some(mut star) = StarQuery::new(schema, &shared.dialect, base) else {
            return Ok(Segment::new(String::new()));
        };

        let mut group_columns = Vec::new();
        for (i, (members, index)) in explicit.iter().enumerate() {
            if Some(i) == group {
                let member = members.member(*index);
                if let Some(parent) = real_parent(members, *index) {
                    star.constrain_member(members, parent, Scope::Subtree);
                }
                let level = &schema.hierarchy(members.hierarchy).levels[member.level.unwrap_or(0)];
                for column in &level.key_columns {
                    if let Some(expr) = star.column(members.hierarchy, column) {
                        group_columns.push(expr);
                    }
                }
            } else {
                star.constrain_member(members, *index, Scope::Subtree);
            }
        }
        for part in compounds {
            match &part.factors {
                Some(factors) => {
                    for (arena, indices) in part.arenas.iter().zip(factors) {
                        star.constrain_members(arena, indices, Scope::Subtree);
                    }
                }
                None => {
                    let tuples: Vec<Vec<(&HierarchyMembers, usize)>> = part
                        .rows
                        .iter()
                        .map(|row| {
                            part.arenas
                                .iter()
                                .map(Arc::as_ref)
                                .zip(row.iter().copied())
                                .collect()
                        })
                        .collect();
                    star.constrain_tuples(&tuples, Scope::Subtree);
                }
            }
        }

        let mut select: Vec<SelectExpr> = group_columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.clone().alias(&format!("c{i}")))
            .collect();
        select.push(star.measure_aggregate(measure).alias("m0"));
        let mut query = star.query().select(select);
        if !group_columns.is_empty() {
            query = query.group_by(group_columns.clone());
        }
        let sql = query.to_sql(&shared.dialect);
        debug!(sql = %sql, measure = %measure.name, "aggregation query");

        let rows = shared.connection.execute_query(&sql, None)?.rows;
        let width = group_columns.len();
        let mut segment = Segment::new(sql);
        for row in rows {
            if row.len() <= width {
                continue;
            }
            let value = CellValue::from_sql(&row[width]);
            segment.insert(row[..width].to_vec(), value);
        }
        Ok(segment)
    }

    /// Format string and formatter of a cell: from the highest solve-order
    /// calculated member that defines a format string, else from the
    /// current measure.
    pub fn cell_format(&self, ctx: &Context) -> EvalResult<CellFormat> {
        let calc_format = ctx
            .members()
            .filter_map(|m| match m {
                MemberRef::Calculated { index, .. } => Some(&self.q.calcs[index]),
                _ => None,
            })
            .filter(|c| c.format_string.is_some())
            .max_by(|a, b| {
                a.solve_order
                    .cmp(&b.solve_order)
                    .then_with(|| b.hierarchy.cmp(&a.hierarchy))
            })
            .and_then(|c| c.format_string.clone());
        if calc_format.is_some() {
            return Ok(CellFormat {
                format_string: calc_format,
                formatter: None,
            });
        }
        Ok(match self.current_member(MEASURES_HIERARCHY, ctx)? {
            MemberRef::Measure(i) => {
                let measure = &self.cube().measures[i];
                CellFormat {
                    format_string: measure.format_string.clone(),
                    formatter: measure.formatter.clone(),
                }
            }
            _ => CellFormat::default(),
        })
    }
}

/// One compound coordinate, resolved against the member arenas.
struct CompoundPart {
    arenas: Vec<Arc<HierarchyMembers>>,
    rows: Vec<Vec<usize>>,
    /// Distinct indices per hierarchy when `rows` is their cross product.
    factors: Option<Vec<Vec<usize>>>,
}

impl CompoundPart {
    /// A crossjoin constrains each hierarchy on its own; any other list
    /// is one tuple predicate.
    fn predicates(&self) -> Vec<Predicate> {
        match &self.factors {
            Some(factors) => self
                .arenas
                .iter()
                .zip(factors)
                .map(|(arena, indices)| {
                    Predicate::members(
                        arena.hierarchy,
                        indices.iter().map(|i| arena.key_path(*i)).collect(),
                    )
                })
                .collect(),
            None => vec![Predicate::tuples(
                self.arenas.iter().map(|a| a.hierarchy).collect(),
                self.rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .zip(&self.arenas)
                            .map(|(i, arena)| arena.key_path(*i))
                            .collect()
                    })
                    .collect(),
            )],
        }
    }
}

/// Parent of `index` unless it is the all member.
fn real_parent(members: &HierarchyMembers, index: usize) -> Option<usize> {
    members
        .member(index)
        .parent
        .filter(|p| !members.member(*p).is_all())
}

fn describe(datum: &Datum) -> &'static str {
    match datum {
        Datum::Value(_) => "a value",
        Datum::Member(_) => "a member",
        Datum::Tuple(_) => "a tuple",
        Datum::Set(_) => "a set",
        Datum::Level(..) => "a level",
        Datum::Hierarchy(_) => "a hierarchy",
    }
}

pub(crate) fn crossjoin(left: &[Tuple], right: &[Tuple]) -> Vec<Tuple> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut tuple = l.clone();
            tuple.extend(r.iter().copied());
            out.push(tuple);
        }
    }
    out
}

/// Arithmetic with MDX empty semantics: empty is neutral for `+` and `-`
/// and makes `*` and `/` empty.
pub(crate) fn arithmetic(op: BinaryOp, l: CellValue, r: CellValue) -> CellValue {
    if let CellValue::Error(_) = l {
        return l;
    }
    if let CellValue::Error(_) = r {
        return r;
    }
    let text = matches!(l, CellValue::Text(_)) || matches!(r, CellValue::Text(_));
    if op == BinaryOp::Add && text && (l.as_f64().is_none() || r.as_f64().is_none()) {
        return CellValue::Text(format!("{l}{r}"));
    }
    let (a, b) = (l.as_f64(), r.as_f64());
    match op {
        BinaryOp::Add | BinaryOp::Sub => match (a, b) {
            (None, None) => CellValue::Empty,
            (Some(a), None) => CellValue::Number(a),
            (None, Some(b)) if op == BinaryOp::Add => CellValue::Number(b),
            (None, Some(b)) => CellValue::Number(-b),
            (Some(a), Some(b)) if op == BinaryOp::Add => CellValue::Number(a + b),
            (Some(a), Some(b)) => CellValue::Number(a - b),
        },
        BinaryOp::Mul => match (a, b) {
            (Some(a), Some(b)) => CellValue::Number(a * b),
            _ => CellValue::Empty,
        },
        BinaryOp::Div => match (a, b) {
            (Some(a), Some(b)) => CellValue::Number(a / b),
            _ => CellValue::Empty,
        },
        _ => CellValue::Empty,
    }
}

/// Order of scalar values: empty first, then numbers, then text.
pub(crate) fn compare_values(l: &CellValue, r: &CellValue) -> Ordering {
    match (l, r) {
        (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(a), None) if r.is_empty() => a.total_cmp(&0.0),
            (None, Some(b)) if l.is_empty() => 0.0f64.total_cmp(&b),
            (None, None) => l.to_string().cmp(&r.to_string()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
        },
    }
}

/// Combine partial values with an aggregator's rollup.
pub(crate) fn rollup(aggregator: Aggregator, values: &[CellValue]) -> CellValue {
    if let Some(err) = values.iter().find(|v| matches!(v, CellValue::Error(_))) {
        return err.clone();
    }
    let numbers: Vec<f64> = values.iter().filter_map(CellValue::as_f64).collect();
    if numbers.is_empty() {
        return CellValue::Empty;
    }
    let result = match aggregator {
        Aggregator::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregator::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Aggregator::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        Aggregator::Sum | Aggregator::Count | Aggregator::DistinctCount => numbers.iter().sum(),
    };
    CellValue::Number(result)
}
