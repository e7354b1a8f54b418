//! Evaluation coordinates.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::member::{MemberRef, Tuple};
use crate::schema::HierarchyId;

/// A list of tuples over the same hierarchies, used as one coordinate:
/// the cell value aggregates over all of them. Produced by a set in the
/// slicer and by `Aggregate` over non-additive measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleList {
    pub hierarchies: Vec<HierarchyId>,
    pub tuples: Vec<Tuple>,
}

impl TupleList {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        let hierarchies = tuples
            .first()
            .map(|t| t.iter().map(|m| m.hierarchy()).collect())
            .unwrap_or_default();
        Self {
            hierarchies,
            tuples,
        }
    }

    pub fn covers(&self, hierarchy: HierarchyId) -> bool {
        self.hierarchies.contains(&hierarchy)
    }

    /// Distinct members per hierarchy if the list is exactly their cross
    /// product, in first-seen order.
    pub fn crossjoin_factors(&self) -> Option<Vec<Vec<MemberRef>>> {
        let mut factors: Vec<Vec<MemberRef>> = vec![Vec::new(); self.hierarchies.len()];
        for tuple in &self.tuples {
            for (i, member) in tuple.iter().enumerate() {
                if !factors[i].contains(member) {
                    factors[i].push(*member);
                }
            }
        }
        let mut distinct: Vec<&Tuple> = Vec::new();
        for tuple in &self.tuples {
            if !distinct.contains(&tuple) {
                distinct.push(tuple);
            }
        }
        let product: usize = factors.iter().map(Vec::len).product();
        (product == distinct.len()).then_some(factors)
    }
}

/// The current member of each hierarchy plus any compound coordinates.
///
/// Hierarchies without an explicit member are at their default member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Context {
    members: BTreeMap<HierarchyId, MemberRef>,
    compound: Vec<Arc<TupleList>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(&self, hierarchy: HierarchyId) -> Option<MemberRef> {
        self.members.get(&hierarchy).copied()
    }

    pub fn members(&self) -> impl Iterator<Item = MemberRef> + '_ {
        self.members.values().copied()
    }

    pub fn compound(&self) -> &[Arc<TupleList>] {
        &self.compound
    }

    /// Whether a compound coordinate constrains `hierarchy`.
    pub fn is_compound(&self, hierarchy: HierarchyId) -> bool {
        self.compound.iter().any(|c| c.covers(hierarchy))
    }

    /// Set one member. A compound coordinate over the same hierarchy is
    /// dropped.
    pub fn set(&mut self, member: MemberRef) {
        let hierarchy = member.hierarchy();
        self.compound.retain(|c| !c.covers(hierarchy));
        self.members.insert(hierarchy, member);
    }

    pub fn with(&self, member: MemberRef) -> Self {
        let mut ctx = self.clone();
        ctx.set(member);
        ctx
    }

    pub fn with_tuple(&self, tuple: &[MemberRef]) -> Self {
        let mut ctx = self.clone();
        for member in tuple {
            ctx.set(*member);
        }
        ctx
    }

    /// Make `list` the coordinate of its hierarchies.
    pub fn with_compound(&self, list: TupleList) -> Self {
        let mut ctx = self.clone();
        ctx.compound
            .retain(|c| !c.hierarchies.iter().any(|h| list.covers(*h)));
        for h in &list.hierarchies {
            ctx.members.remove(h);
        }
        ctx.compound.push(Arc::new(list));
        ctx
    }
}
