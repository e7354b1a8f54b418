//! Star-join SQL over one base cube.
//!
//! A [`StarQuery`] collects the FROM list (fact table plus each joined
//! dimension table, comma-joined) and WHERE predicates. Cell aggregation
//! and drill-through both build their SQL through it; they differ in
//! [`Scope`]: aggregation constrains a parent-child member to its whole
//! subtree, drill-through to the member's own key.

use std::collections::{HashMap, HashSet};

use super::member::HierarchyMembers;
use super::parent_child::{self, SubtreeFilter};
use crate::connection::Value;
use crate::schema::{Aggregator, Cube, HierarchyId, Measure, Schema};
use crate::sql::{
    and_all, count_distinct, count_star, func, lit_float, lit_int, lit_null, lit_str, or_all,
    table_col, Dialect, Expr, ExprExt, Query, SqlDialect, TableRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The member and everything below it.
    Subtree,
    /// Rows keyed exactly by the member.
    Own,
}

/// SQL literal for a key value.
pub fn literal(value: &Value) -> Expr {
    match value {
        Value::Null => lit_null(),
        Value::Int(i) => lit_int(*i),
        Value::Float(f) => lit_float(*f),
        Value::Text(s) => lit_str(s),
    }
}

fn equals(column: Expr, value: &Value) -> Expr {
    match value {
        Value::Null => column.is_null(),
        v => column.eq(literal(v)),
    }
}

fn always_false() -> Expr {
    lit_int(1).eq(lit_int(0))
}

/// Restriction of one member, before rendering.
#[derive(Debug, Clone)]
enum Condition {
    /// Column equalities; empty for an all member.
    Path(Vec<(Expr, Value)>),
    /// `column IN (keys)` over a parent-child subtree.
    Keys(Expr, Vec<Value>),
}

impl Condition {
    fn is_unconstrained(&self) -> bool {
        matches!(self, Condition::Path(path) if path.is_empty())
    }

    fn shape(&self) -> Option<Vec<Expr>> {
        match self {
            Condition::Path(path) => Some(path.iter().map(|(c, _)| c.clone()).collect()),
            Condition::Keys(..) => None,
        }
    }
}

pub struct StarQuery<'a> {
    schema: &'a Schema,
    dialect: &'a Dialect,
    cube: &'a Cube,
    fact_alias: String,
    from: Vec<TableRef>,
    /// (table, foreign key) -> alias
    joined: HashMap<(String, String), String>,
    aliases: HashSet<String>,
    predicates: Vec<Expr>,
}

impl<'a> StarQuery<'a> {
    /// `None` for a virtual cube.
    pub fn new(schema: &'a Schema, dialect: &'a Dialect, cube: &'a Cube) -> Option<Self> {
        let fact_table = cube.fact_table()?;
        let mut star = Self {
            schema,
            dialect,
            cube,
            fact_alias: String::new(),
            from: Vec::new(),
            joined: HashMap::new(),
            aliases: HashSet::new(),
            predicates: Vec::new(),
        };
        star.fact_alias = star.add_table(fact_table);
        Some(star)
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn cube(&self) -> &'a Cube {
        self.cube
    }

    pub fn fact_alias(&self) -> &str {
        &self.fact_alias
    }

    fn add_table(&mut self, table: &str) -> String {
        let mut alias = table.to_string();
        let mut n = 1;
        while self.aliases.contains(&alias) {
            alias = format!("{table}_{n}");
            n += 1;
        }
        self.aliases.insert(alias.clone());
        self.from.push(TableRef::new(table).with_alias(&alias));
        alias
    }

    /// Alias under which `hierarchy`'s columns are reachable, joining its
    /// table on first use. `None` if the cube does not use the dimension.
    pub fn join(&mut self, hierarchy: HierarchyId) -> Option<String> {
        let schema = self.schema;
        let usage = schema.joins(self.cube.id, hierarchy)?;
        let h = schema.hierarchy(hierarchy);
        let (Some(table), Some(pk), Some(fk)) = (&h.table, &h.primary_key, &usage.foreign_key)
        else {
            return Some(self.fact_alias.clone());
        };
        if let Some(alias) = self.joined.get(&(table.clone(), fk.clone())) {
            return Some(alias.clone());
        }
        let alias = self.add_table(table);
        self.predicates
            .push(table_col(&self.fact_alias, fk).eq(table_col(&alias, pk)));
        self.joined.insert((table.clone(), fk.clone()), alias.clone());
        Some(alias)
    }

    pub fn column(&mut self, hierarchy: HierarchyId, column: &str) -> Option<Expr> {
        let alias = self.join(hierarchy)?;
        Some(table_col(&alias, column))
    }

    /// The raw fact column of a measure, `None` for `COUNT(*)` measures.
    pub fn measure_column(&self, measure: &Measure) -> Option<Expr> {
        measure
            .column
            .as_deref()
            .map(|c| table_col(&self.fact_alias, c))
    }

    pub fn measure_aggregate(&self, measure: &Measure) -> Expr {
        let column = self.measure_column(measure);
        match (measure.aggregator, column) {
            (_, None) => count_star(),
            (Aggregator::Sum, Some(c)) => func("SUM", vec![c]),
            (Aggregator::Count, Some(c)) => func("COUNT", vec![c]),
            (Aggregator::DistinctCount, Some(c)) => count_distinct(c),
            (Aggregator::Min, Some(c)) => func("MIN", vec![c]),
            (Aggregator::Max, Some(c)) => func("MAX", vec![c]),
            (Aggregator::Avg, Some(c)) => func("AVG", vec![c]),
        }
    }

    pub fn constrain(&mut self, predicate: Expr) {
        self.predicates.push(predicate);
    }

    fn condition(
        &mut self,
        members: &HierarchyMembers,
        index: usize,
        scope: Scope,
    ) -> Option<Condition> {
        let member = members.member(index);
        let Some(level) = member.level else {
            return Some(Condition::Path(Vec::new()));
        };
        let schema = self.schema;
        let hierarchy = schema.hierarchy(members.hierarchy);
        let alias = self.join(members.hierarchy)?;
        let level = &hierarchy.levels[level];

        if level.is_parent_child() {
            let column = table_col(&alias, level.key_columns.first()?);
            return Some(match scope {
                Scope::Own => Condition::Path(
                    member
                        .key
                        .first()
                        .map(|k| vec![(column, k.clone())])
                        .unwrap_or_default(),
                ),
                Scope::Subtree => {
                    Condition::Keys(column, parent_child::subtree_keys(members, &[index]))
                }
            });
        }

        let mut path = Vec::new();
        for i in members.ancestors(index).into_iter().chain([index]) {
            let m = members.member(i);
            let Some(level) = m.level else { continue };
            for (column, value) in hierarchy.levels[level].key_columns.iter().zip(&m.key) {
                path.push((table_col(&alias, column), value.clone()));
            }
        }
        Some(Condition::Path(path))
    }

    /// Restrict to one member. `false` if the cube cannot reach the
    /// member's hierarchy.
    pub fn constrain_member(
        &mut self,
        members: &HierarchyMembers,
        index: usize,
        scope: Scope,
    ) -> bool {
        let schema = self.schema;
        let hierarchy = schema.hierarchy(members.hierarchy);
        let closure = hierarchy
            .parent_child_level()
            .and_then(|(_, level)| level.parent_child.as_ref())
            .filter(|_| scope == Scope::Subtree && !members.member(index).is_all());
        if let Some(pc) = closure {
            if let SubtreeFilter::Closure { closure, key } =
                parent_child::subtree_filter(pc, members, index)
            {
                let Some(key_column) = hierarchy
                    .parent_child_level()
                    .and_then(|(_, level)| level.key_columns.first().cloned())
                else {
                    return false;
                };
                let Some(dim_key) = self.column(members.hierarchy, &key_column) else {
                    return false;
                };
                let alias = self.add_table(&closure.table);
                self.predicates
                    .push(table_col(&alias, &closure.child_column).eq(dim_key));
                self.predicates
                    .push(table_col(&alias, &closure.parent_column).eq(literal(&key)));
                return true;
            }
        }
        self.constrain_members(members, &[index], scope)
    }

    /// Restrict to the union of several members of one hierarchy.
    pub fn constrain_members(
        &mut self,
        members: &HierarchyMembers,
        indices: &[usize],
        scope: Scope,
    ) -> bool {
        let mut conditions = Vec::new();
        for index in indices {
            match self.condition(members, *index, scope) {
                Some(c) => conditions.push(c),
                None => return false,
            }
        }
        if conditions.iter().any(Condition::is_unconstrained) {
            return true;
        }
        let predicate = self.fold(conditions.into_iter().map(|c| vec![c]).collect());
        self.predicates.push(predicate);
        true
    }

    /// Restrict to a list of tuples, each given as one (members, index)
    /// pair per hierarchy.
    pub fn constrain_tuples(
        &mut self,
        tuples: &[Vec<(&HierarchyMembers, usize)>],
        scope: Scope,
    ) -> bool {
        let mut rows = Vec::new();
        for tuple in tuples {
            let mut row = Vec::new();
            for (members, index) in tuple {
                match self.condition(members, *index, scope) {
                    Some(c) if c.is_unconstrained() => {}
                    Some(c) => row.push(c),
                    None => return false,
                }
            }
            if row.is_empty() {
                return true;
            }
            rows.push(row);
        }
        let predicate = self.fold(rows);
        self.predicates.push(predicate);
        true
    }

    /// OR of rows, each an AND of conditions. Rows of equal column shape
    /// collapse into `IN` lists where the dialect allows.
    fn fold(&self, rows: Vec<Vec<Condition>>) -> Expr {
        if rows.is_empty() {
            return always_false();
        }
        let shapes: Option<Vec<Vec<Expr>>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(Condition::shape)
                    .collect::<Option<Vec<_>>>()
                    .map(|s| s.concat())
            })
            .collect();
        if let Some(shapes) = shapes {
            if shapes.windows(2).all(|w| w[0] == w[1]) {
                let values = rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .flat_map(|c| match c {
                                Condition::Path(path) => {
                                    path.iter().map(|(_, v)| v.clone()).collect()
                                }
                                Condition::Keys(..) => Vec::new(),
                            })
                            .collect()
                    })
                    .collect();
                return self.fold_rows(&shapes[0], values);
            }
        }
        let disjuncts = rows
            .into_iter()
            .filter_map(|row| and_all(row.into_iter().map(|c| self.render(c)).collect()))
            .collect();
        or_all(disjuncts).unwrap_or_else(always_false)
    }

    fn render(&self, condition: Condition) -> Expr {
        match condition {
            Condition::Path(path) => {
                let columns: Vec<Expr> = path.iter().map(|(c, _)| c.clone()).collect();
                let values = path.into_iter().map(|(_, v)| v).collect();
                self.fold_rows(&columns, vec![values])
            }
            Condition::Keys(column, keys) => {
                self.fold_rows(&[column], keys.into_iter().map(|k| vec![k]).collect())
            }
        }
    }

    /// `columns` matching any of `rows`.
    fn fold_rows(&self, columns: &[Expr], rows: Vec<Vec<Value>>) -> Expr {
        let mut distinct: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
        for row in rows {
            if !distinct.contains(&row) {
                distinct.push(row);
            }
        }
        if distinct.is_empty() {
            return always_false();
        }

        if let [column] = columns {
            let (nulls, values): (Vec<_>, Vec<_>) = distinct
                .into_iter()
                .filter_map(|row| row.into_iter().next())
                .partition(Value::is_null);
            let mut parts = Vec::new();
            match values.as_slice() {
                [] => {}
                [value] => parts.push(equals(column.clone(), value)),
                _ => parts.push(column.clone().in_list(values.iter().map(literal).collect())),
            }
            if !nulls.is_empty() {
                parts.push(column.clone().is_null());
            }
            return or_all(parts).unwrap_or_else(always_false);
        }

        let has_null = distinct.iter().flatten().any(Value::is_null);
        if distinct.len() > 1 && !has_null && self.dialect.supports_multi_value_in_expr() {
            return Expr::Row(columns.to_vec()).in_list(
                distinct
                    .iter()
                    .map(|row| Expr::Row(row.iter().map(literal).collect()))
                    .collect(),
            );
        }
        let disjuncts = distinct
            .iter()
            .filter_map(|row| {
                and_all(
                    columns
                        .iter()
                        .zip(row)
                        .map(|(c, v)| equals(c.clone(), v))
                        .collect(),
                )
            })
            .collect();
        or_all(disjuncts).unwrap_or_else(always_false)
    }

    /// FROM and WHERE; the caller adds the select list.
    pub fn query(&self) -> Query {
        Query {
            from: self.from.clone(),
            predicates: self.predicates.clone(),
            ..Query::new()
        }
    }
}
