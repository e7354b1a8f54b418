//! Built-in MDX functions and member methods.
//!
//! Function and method names match case-insensitively. A call that names
//! no built-in function goes to the session's user-defined functions.

use std::collections::HashSet;

use super::context::{Context, TupleList};
use super::eval::{compare_values, crossjoin, rollup, Datum, Evaluator};
use super::member::{MemberRef, Tuple};
use super::value::CellValue;
use super::{EvalError, EvalResult};
use crate::mdx::Expr;
use crate::schema::{Aggregator, HierarchyId, MEASURES_HIERARCHY};

/// A bare-word flag argument such as `LEAVES` or `BDESC`, uppercased.
fn flag(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Id(id) => id.as_bare_word().map(str::to_ascii_uppercase),
        Expr::Str(s) => Some(s.to_ascii_uppercase()),
        _ => None,
    }
}

fn signature(name: &str, args: &[Expr]) -> EvalError {
    let params = args.iter().map(ToString::to_string).collect::<Vec<_>>();
    EvalError::UnknownFunction(format!("{name}({})", params.join(", ")))
}

impl<'q> Evaluator<'q> {
    pub(super) fn call(&self, name: &str, args: &[Expr], ctx: &Context) -> EvalResult<Datum> {
        let arg = |i: usize| args.get(i).filter(|a| !matches!(a, Expr::Empty));
        let required = |i: usize| arg(i).ok_or_else(|| signature(name, args));

        match name.to_ascii_lowercase().as_str() {
            "crossjoin" => {
                if args.len() < 2 {
                    return Err(signature(name, args));
                }
                let mut tuples = self.eval_set(&args[0], ctx)?;
                for next in &args[1..] {
                    tuples = crossjoin(&tuples, &self.eval_set(next, ctx)?);
                }
                Ok(Datum::Set(tuples))
            }
            "descendants" => {
                let member = self.eval_member(required(0)?, ctx)?;
                let depth = arg(1).map(|e| self.eval(e, ctx)).transpose()?;
                let mode = match args.get(2).filter(|a| !matches!(a, Expr::Empty)) {
                    Some(e) => flag(e).ok_or_else(|| signature(name, args))?,
                    None if depth.is_some() => "SELF".to_string(),
                    None => "SELF_BEFORE_AFTER".to_string(),
                };
                self.descendants(member, depth, &mode)
            }
            "filter" => {
                let set = self.eval_set(required(0)?, ctx)?;
                let condition = required(1)?;
                let mut out = Vec::new();
                for tuple in set {
                    if self.eval_scalar(condition, &ctx.with_tuple(&tuple))?.is_true() {
                        out.push(tuple);
                    }
                }
                Ok(Datum::Set(out))
            }
            "order" => {
                let set = self.eval_set(required(0)?, ctx)?;
                let key = required(1)?;
                let direction = args.get(2).and_then(flag).unwrap_or_else(|| "ASC".into());
                let mut keyed = Vec::with_capacity(set.len());
                for tuple in set {
                    let value = self.eval_scalar(key, &ctx.with_tuple(&tuple))?;
                    keyed.push((value, tuple));
                }
                match direction.as_str() {
                    "ASC" | "BASC" => keyed.sort_by(|a, b| compare_values(&a.0, &b.0)),
                    "DESC" | "BDESC" => keyed.sort_by(|a, b| compare_values(&b.0, &a.0)),
                    _ => return Err(signature(name, args)),
                }
                Ok(Datum::Set(keyed.into_iter().map(|(_, t)| t).collect()))
            }
            "head" | "tail" => {
                let mut set = self.eval_set(required(0)?, ctx)?;
                let count = match arg(1) {
                    Some(e) => self.eval_int(e, ctx)?.max(0) as usize,
                    None => 1,
                };
                let count = count.min(set.len());
                if name.eq_ignore_ascii_case("head") {
                    set.truncate(count);
                } else {
                    set.drain(..set.len() - count);
                }
                Ok(Datum::Set(set))
            }
            "union" => {
                let keep_all = args.len() > 2 && args.last().and_then(flag).as_deref() == Some("ALL");
                let sets = if keep_all { &args[..args.len() - 1] } else { args };
                let mut out: Vec<Tuple> = Vec::new();
                let mut seen = HashSet::new();
                for set in sets {
                    for tuple in self.eval_set(set, ctx)? {
                        if keep_all || seen.insert(tuple.clone()) {
                            out.push(tuple);
                        }
                    }
                }
                Ok(Datum::Set(out))
            }
            "except" => {
                let set = self.eval_set(required(0)?, ctx)?;
                let remove: HashSet<Tuple> = self.eval_set(required(1)?, ctx)?.into_iter().collect();
                Ok(Datum::Set(
                    set.into_iter().filter(|t| !remove.contains(t)).collect(),
                ))
            }
            "hierarchize" => {
                let mut set = self.eval_set(required(0)?, ctx)?;
                // Stored members are laid out in preorder, so arena order is
                // hierarchical order.
                set.sort_by_key(|tuple| {
                    tuple
                        .iter()
                        .map(|m| match m {
                            MemberRef::Stored { index, .. } => (0, *index),
                            MemberRef::Measure(i) => (0, *i),
                            MemberRef::Calculated { index, .. } => (1, *index),
                            MemberRef::Null(_) => (2, 0),
                        })
                        .collect::<Vec<_>>()
                });
                Ok(Datum::Set(set))
            }
            "ancestor" => {
                let member = self.eval_member(required(0)?, ctx)?;
                let target = match self.eval(required(1)?, ctx)? {
                    Datum::Level(h, level) if h == member.hierarchy() => {
                        match self.level_depth(h, level) {
                            Some(depth) => depth,
                            None => return Ok(Datum::Member(MemberRef::Null(h))),
                        }
                    }
                    Datum::Level(..) => return Ok(Datum::Member(MemberRef::Null(member.hierarchy()))),
                    other => {
                        let distance = self.value_of(other, ctx)?.as_f64().unwrap_or(0.0) as usize;
                        self.depth(member)?.saturating_sub(distance)
                    }
                };
                Ok(Datum::Member(self.ancestor_at(member, target)?))
            }
            "openingperiod" | "closingperiod" => {
                let (h, level) = self.eval_level(required(0)?, ctx)?;
                let member = match arg(1) {
                    Some(e) => self.eval_member(e, ctx)?,
                    None => self.current_member(h, ctx)?,
                };
                let first = name.eq_ignore_ascii_case("openingperiod");
                Ok(Datum::Member(self.period(member, h, level, first)?))
            }
            "sum" | "avg" | "min" | "max" => {
                let values = self.set_values(required(0)?, arg(1), ctx)?;
                let aggregator = match name.to_ascii_lowercase().as_str() {
                    "sum" => Aggregator::Sum,
                    "avg" => Aggregator::Avg,
                    "min" => Aggregator::Min,
                    _ => Aggregator::Max,
                };
                Ok(Datum::Value(rollup(aggregator, &values)))
            }
            "count" => {
                let exclude_empty = args.get(1).and_then(flag).as_deref() == Some("EXCLUDEEMPTY");
                let set = self.eval_set(required(0)?, ctx)?;
                if !exclude_empty {
                    return Ok(Datum::Value(CellValue::Number(set.len() as f64)));
                }
                let mut count = 0usize;
                for tuple in &set {
                    if !self.cell_value(&ctx.with_tuple(tuple))?.is_empty() {
                        count += 1;
                    }
                }
                Ok(Datum::Value(CellValue::Number(count as f64)))
            }
            "aggregate" => self.aggregate(required(0)?, arg(1), ctx).map(Datum::Value),
            "iif" => {
                let condition = self.eval_scalar(required(0)?, ctx)?;
                let branch = if condition.is_true() { required(1)? } else { required(2)? };
                self.eval(branch, ctx)
            }
            "isempty" => {
                let value = self.eval_scalar(required(0)?, ctx)?;
                Ok(Datum::Value(CellValue::Bool(value.is_empty())))
            }
            "coalesceempty" => {
                for expr in args {
                    let value = self.eval_scalar(expr, ctx)?;
                    if !value.is_empty() {
                        return Ok(Datum::Value(value));
                    }
                }
                Ok(Datum::Value(CellValue::Empty))
            }
            _ => self.call_udf(name, args, ctx),
        }
    }

    fn call_udf(&self, name: &str, args: &[Expr], ctx: &Context) -> EvalResult<Datum> {
        let Some(udf) = self.q.shared.udfs.get(&name.to_ascii_lowercase()) else {
            return Err(signature(name, args));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_scalar(arg, ctx)?);
        }
        udf.check_args(&values)
            .map_err(|message| EvalError::UdfSignature {
                function: udf.signature(),
                message,
            })?;
        Ok(Datum::Value(match udf.execute(&values) {
            Ok(value) => value,
            Err(message) => CellValue::Error(message),
        }))
    }

    pub(super) fn method(
        &self,
        target: &Expr,
        name: &str,
        args: &[Expr],
        ctx: &Context,
    ) -> EvalResult<Datum> {
        let datum = self.eval(target, ctx)?;
        let lower = name.to_ascii_lowercase();
        let member_of = |datum: Datum| self.to_member(datum, ctx);

        match lower.as_str() {
            "members" | "allmembers" => {
                let (members, calcs) = match datum {
                    Datum::Hierarchy(h) => (self.hierarchy_members(h)?, self.calculated_members(h)),
                    Datum::Level(h, level) => {
                        let calcs = self
                            .calculated_members(h)
                            .into_iter()
                            .filter(|c| {
                                h != MEASURES_HIERARCHY
                                    && self.level_of(*c).map(|l| l == level).unwrap_or(false)
                            })
                            .collect();
                        (self.level_members(h, level)?, calcs)
                    }
                    Datum::Member(m) => (self.hierarchy_members(m.hierarchy())?, Vec::new()),
                    _ => return Err(signature(&format!("{target}.{name}"), args)),
                };
                let mut set: Vec<Tuple> = members.into_iter().map(|m| vec![m]).collect();
                if lower == "allmembers" {
                    set.extend(calcs.into_iter().map(|m| vec![m]));
                }
                Ok(Datum::Set(set))
            }
            "currentmember" => {
                let h = self.hierarchy_of(datum)?;
                Ok(Datum::Member(self.current_member(h, ctx)?))
            }
            "defaultmember" => {
                let h = self.hierarchy_of(datum)?;
                Ok(Datum::Member(self.default_member(h)?))
            }
            "children" => {
                let member = member_of(datum)?;
                Ok(Datum::Set(
                    self.children(member)?.into_iter().map(|m| vec![m]).collect(),
                ))
            }
            "parent" => Ok(Datum::Member(self.parent(member_of(datum)?)?)),
            "prevmember" => Ok(Datum::Member(self.lag(member_of(datum)?, 1)?)),
            "nextmember" => Ok(Datum::Member(self.lag(member_of(datum)?, -1)?)),
            "lag" | "lead" => {
                let member = member_of(datum)?;
                let n = match args.first() {
                    Some(e) => self.eval_int(e, ctx)?,
                    None => return Err(signature(&format!("{target}.{name}"), args)),
                };
                let offset = if lower == "lag" { n } else { -n };
                Ok(Datum::Member(self.lag(member, offset)?))
            }
            "firstchild" | "lastchild" => {
                let member = member_of(datum)?;
                let children = self.children(member)?;
                let child = if lower == "firstchild" {
                    children.first()
                } else {
                    children.last()
                };
                Ok(Datum::Member(
                    child.copied().unwrap_or(MemberRef::Null(member.hierarchy())),
                ))
            }
            "siblings" | "firstsibling" | "lastsibling" => {
                let member = member_of(datum)?;
                let siblings = self.siblings(member)?;
                Ok(match lower.as_str() {
                    "siblings" => Datum::Set(siblings.into_iter().map(|m| vec![m]).collect()),
                    "firstsibling" => Datum::Member(siblings.first().copied().unwrap_or(member)),
                    _ => Datum::Member(siblings.last().copied().unwrap_or(member)),
                })
            }
            "name" | "caption" | "uniquename" => {
                let unique = lower == "uniquename";
                let text = match datum {
                    Datum::Level(h, level) => {
                        let level = &self.schema().hierarchy(h).levels[level];
                        if unique { level.unique_name.clone() } else { level.name.clone() }
                    }
                    Datum::Hierarchy(h) => {
                        let hierarchy = self.schema().hierarchy(h);
                        if unique { hierarchy.unique_name.clone() } else { hierarchy.name.clone() }
                    }
                    other => {
                        let member = member_of(other)?;
                        if unique { self.unique_name(member)? } else { self.name(member)? }
                    }
                };
                Ok(Datum::Value(CellValue::Text(text)))
            }
            "level" => {
                let member = member_of(datum)?;
                Ok(Datum::Level(member.hierarchy(), self.level_of(member)?))
            }
            "hierarchy" | "dimension" => Ok(Datum::Hierarchy(self.hierarchy_of(datum)?)),
            "ordinal" => {
                let ordinal = match datum {
                    Datum::Level(_, level) => level,
                    other => self.level_of(member_of(other)?)?,
                };
                Ok(Datum::Value(CellValue::Number(ordinal as f64)))
            }
            "value" => Ok(Datum::Value(self.value_of(datum, ctx)?)),
            "count" => {
                let set = self.to_set(datum, ctx)?;
                Ok(Datum::Value(CellValue::Number(set.len() as f64)))
            }
            "item" => {
                let index = match args.first() {
                    Some(e) => self.eval_int(e, ctx)?,
                    None => return Err(signature(&format!("{target}.{name}"), args)),
                };
                let item = usize::try_from(index).ok();
                match datum {
                    Datum::Tuple(tuple) => Ok(item
                        .and_then(|i| tuple.get(i).copied())
                        .map(Datum::Member)
                        .unwrap_or(Datum::Value(CellValue::Empty))),
                    other => {
                        let set = self.to_set(other, ctx)?;
                        Ok(match item.and_then(|i| set.get(i)) {
                            Some(tuple) if tuple.len() == 1 => Datum::Member(tuple[0]),
                            Some(tuple) => Datum::Tuple(tuple.clone()),
                            None => Datum::Value(CellValue::Empty),
                        })
                    }
                }
            }
            _ => Err(signature(&format!("{target}.{name}"), args)),
        }
    }

    fn hierarchy_of(&self, datum: Datum) -> EvalResult<HierarchyId> {
        match datum {
            Datum::Hierarchy(h) | Datum::Level(h, _) => Ok(h),
            Datum::Member(m) => Ok(m.hierarchy()),
            Datum::Tuple(t) if t.len() == 1 => Ok(t[0].hierarchy()),
            _ => Err(EvalError::Type("expected a hierarchy".into())),
        }
    }

    /// Tree depth of a level, `None` for a parent-child level whose
    /// members sit at many depths.
    fn level_depth(&self, h: HierarchyId, level: usize) -> Option<usize> {
        let hierarchy = self.schema().hierarchy(h);
        match hierarchy.levels.get(level) {
            Some(l) if !l.is_parent_child() => Some(level + 1),
            _ => None,
        }
    }

    fn lag(&self, member: MemberRef, offset: i64) -> EvalResult<MemberRef> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => self
                .q
                .members(hierarchy)?
                .lag(index, offset)
                .map(|i| MemberRef::stored(hierarchy, i))
                .unwrap_or(MemberRef::Null(hierarchy)),
            MemberRef::Measure(i) => {
                let target = i as i64 - offset;
                if target >= 0 && (target as usize) < self.cube().measures.len() {
                    MemberRef::Measure(target as usize)
                } else {
                    MemberRef::Null(MEASURES_HIERARCHY)
                }
            }
            other => MemberRef::Null(other.hierarchy()),
        })
    }

    fn siblings(&self, member: MemberRef) -> EvalResult<Vec<MemberRef>> {
        Ok(match member {
            MemberRef::Stored { hierarchy, index } => {
                let members = self.q.members(hierarchy)?;
                if members.member(index).is_all() {
                    vec![member]
                } else {
                    members
                        .siblings(index)
                        .into_iter()
                        .map(|i| MemberRef::stored(hierarchy, i))
                        .collect()
                }
            }
            MemberRef::Measure(_) => self.measures(),
            MemberRef::Calculated { .. } => vec![member],
            MemberRef::Null(_) => Vec::new(),
        })
    }

    fn ancestor_at(&self, member: MemberRef, depth: usize) -> EvalResult<MemberRef> {
        let mut current = member;
        while !matches!(current, MemberRef::Null(_)) && self.depth(current)? > depth {
            current = self.parent(current)?;
        }
        if matches!(current, MemberRef::Null(_)) || self.depth(current)? != depth {
            return Ok(MemberRef::Null(member.hierarchy()));
        }
        Ok(current)
    }

    /// First (or last) descendant of `member` at `level`. A calculated
    /// member is its own period.
    fn period(
        &self,
        member: MemberRef,
        h: HierarchyId,
        level: usize,
        first: bool,
    ) -> EvalResult<MemberRef> {
        if member.is_calculated() || matches!(member, MemberRef::Null(_)) {
            return Ok(member);
        }
        let Some(target) = self.level_depth(h, level) else {
            return Ok(member);
        };
        let mut current = member;
        loop {
            let depth = self.depth(current)?;
            if depth == target {
                return Ok(current);
            }
            if depth > target {
                return Ok(MemberRef::Null(h));
            }
            let children = self.children(current)?;
            let next = if first { children.first() } else { children.last() };
            match next {
                Some(child) => current = *child,
                None => return Ok(MemberRef::Null(h)),
            }
        }
    }

    fn descendants(&self, member: MemberRef, depth: Option<Datum>, flag: &str) -> EvalResult<Datum> {
        let (hierarchy, index) = match member {
            MemberRef::Stored { hierarchy, index } => (hierarchy, index),
            MemberRef::Null(_) => return Ok(Datum::Set(Vec::new())),
            other => return Ok(Datum::Set(vec![vec![other]])),
        };
        let members = self.q.members(hierarchy)?;
        let base = members.member(index).depth;
        let has_depth = depth.is_some();
        let target = match depth {
            None => base,
            Some(Datum::Level(h, level)) if h == hierarchy => {
                self.level_depth(h, level).unwrap_or(base)
            }
            Some(Datum::Value(v)) => base + v.as_f64().unwrap_or(0.0).max(0.0) as usize,
            Some(_) => {
                return Err(EvalError::Type(format!(
                    "Descendants of '{}' needs a level of the same hierarchy or a distance",
                    members.member(index).unique_name
                )))
            }
        };

        let keep: fn(usize, usize, bool) -> bool = match flag {
            "SELF" => |d, t, _| d == t,
            "AFTER" => |d, t, _| d > t,
            "BEFORE" => |d, t, _| d < t,
            "SELF_AND_AFTER" => |d, t, _| d >= t,
            "SELF_AND_BEFORE" => |d, t, _| d <= t,
            "SELF_BEFORE_AFTER" => |_, _, _| true,
            "LEAVES" if !has_depth => |_, _, leaf| leaf,
            "LEAVES" => |d, t, leaf| d == t || (d < t && leaf),
            other => {
                return Err(EvalError::Type(format!(
                    "unknown Descendants flag '{other}'"
                )))
            }
        };
        Ok(Datum::Set(
            members
                .subtree(index)
                .into_iter()
                .filter(|i| {
                    let m = members.member(*i);
                    keep(m.depth, target, m.children.is_empty())
                })
                .map(|i| vec![MemberRef::stored(hierarchy, i)])
                .collect(),
        ))
    }

    /// Cell values of each tuple of a set, or of `expr` at each tuple.
    fn set_values(&self, set: &Expr, expr: Option<&Expr>, ctx: &Context) -> EvalResult<Vec<CellValue>> {
        let tuples = self.eval_set(set, ctx)?;
        let mut values = Vec::with_capacity(tuples.len());
        for tuple in &tuples {
            let at = ctx.with_tuple(tuple);
            values.push(match expr {
                Some(e) => self.eval_scalar(e, &at)?,
                None => self.cell_value(&at)?,
            });
        }
        Ok(values)
    }

    /// `Aggregate(set)`: rolls up with the current measure's aggregator.
    /// Measures whose partial values do not combine are evaluated once
    /// over the whole set, with calculated members in it replaced by the
    /// stored members they stand for.
    fn aggregate(&self, set_expr: &Expr, expr: Option<&Expr>, ctx: &Context) -> EvalResult<CellValue> {
        let set = self.eval_set(set_expr, ctx)?;
        if set.is_empty() {
            return Ok(CellValue::Empty);
        }
        let aggregator = match self.current_member(MEASURES_HIERARCHY, ctx)? {
            MemberRef::Measure(i) => Some(self.cube().measures[i].aggregator),
            _ => None,
        };
        let calc_in_set = set.iter().flatten().any(|m| m.is_calculated());

        let set = match aggregator {
            Some(aggregator) if aggregator.is_additive() => {
                let mut values = Vec::with_capacity(set.len());
                for tuple in &set {
                    let at = ctx.with_tuple(tuple);
                    values.push(match expr {
                        Some(e) => self.eval_scalar(e, &at)?,
                        None => self.cell_value(&at)?,
                    });
                }
                return Ok(rollup(aggregator, &values));
            }
            Some(_) if calc_in_set => self.stored_tuples(&set, ctx)?,
            _ => set,
        };
        if set.is_empty() {
            return Ok(CellValue::Empty);
        }
        match expr {
            Some(e) => self.eval_scalar(e, &ctx.with_compound(TupleList::new(set))),
            None if set.len() == 1 => self.cell_value(&ctx.with_tuple(&set[0])),
            None => self.cell_value(&ctx.with_compound(TupleList::new(set))),
        }
    }
}
