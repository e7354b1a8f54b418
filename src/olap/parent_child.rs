//! Parent-child hierarchies.
//!
//! Members come from a self-referencing table: each row names its parent
//! by key. The tree is built in memory with an explicit visited set, so
//! depth is whatever the data holds and cyclic data is reported naming a
//! key on the cycle instead of recursing forever.
//!
//! Aggregating a member means aggregating its whole subtree. With a
//! closure table that is a join (`closure.parent = key`); without one it
//! is `key IN (subtree keys)`. Both select the same fact rows.

use std::collections::HashMap;

use tracing::warn;

use super::member::{HierarchyMembers, MemberNode};
use crate::connection::Value;
use crate::schema::{ClosureDef, Hierarchy, ParentChild, SchemaError, SchemaResult};

/// One row of a parent-child table.
#[derive(Debug, Clone)]
pub struct ParentChildRow {
    pub key: Value,
    pub parent: Value,
    pub caption: String,
    pub ordinal: Option<Value>,
}

fn is_root(parent: &Value, pc: &ParentChild) -> bool {
    parent.is_null()
        || pc
            .null_parent_value
            .as_deref()
            .is_some_and(|v| parent.to_string() == v)
}

/// Turn rows into member nodes, rejecting cycles.
///
/// A row whose parent does not exist becomes a root.
pub fn build_tree(
    hierarchy: &Hierarchy,
    level: usize,
    pc: &ParentChild,
    rows: Vec<ParentChildRow>,
) -> SchemaResult<Vec<MemberNode>> {
    let mut index: HashMap<Value, usize> = HashMap::with_capacity(rows.len());
    let mut unique = Vec::with_capacity(rows.len());
    for row in rows {
        if index.contains_key(&row.key) {
            warn!(
                hierarchy = %hierarchy.unique_name,
                key = %row.key,
                "duplicate parent-child key, keeping the first row"
            );
            continue;
        }
        index.insert(row.key.clone(), unique.len());
        unique.push(row);
    }

    let parents: Vec<Option<usize>> = unique
        .iter()
        .map(|row| {
            if is_root(&row.parent, pc) {
                return None;
            }
            let parent = index.get(&row.parent).copied();
            if parent.is_none() {
                warn!(
                    hierarchy = %hierarchy.unique_name,
                    key = %row.key,
                    parent = %row.parent,
                    "parent not found, treating member as a root"
                );
            }
            parent
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    let mut stack = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(i),
            None => stack.push(i),
        }
    }

    let mut visited = vec![false; unique.len()];
    while let Some(i) = stack.pop() {
        if std::mem::replace(&mut visited[i], true) {
            continue;
        }
        stack.extend(children[i].iter().copied());
    }

    if let Some(start) = visited.iter().position(|v| !v) {
        return Err(SchemaError::ParentChildCycle {
            hierarchy: hierarchy.unique_name.clone(),
            key: unique[cycle_member(&parents, start)].key.to_string(),
        });
    }

    Ok(unique
        .into_iter()
        .zip(parents)
        .map(|(row, parent)| MemberNode {
            name: row.caption,
            key: vec![row.key],
            ordinal: row.ordinal,
            level,
            parent,
        })
        .collect())
}

/// First node seen twice when following parents from `start`.
fn cycle_member(parents: &[Option<usize>], start: usize) -> usize {
    let mut seen = vec![false; parents.len()];
    let mut current = start;
    loop {
        if std::mem::replace(&mut seen[current], true) {
            return current;
        }
        match parents[current] {
            Some(p) => current = p,
            // Unreachable for a node not visited from any root
            None => return current,
        }
    }
}

/// How to restrict fact rows to the subtree of a member.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtreeFilter {
    /// Join the closure table on the member key.
    Closure { closure: ClosureDef, key: Value },
    /// Keys of the member and all its descendants.
    Keys(Vec<Value>),
}

pub fn subtree_filter(pc: &ParentChild, members: &HierarchyMembers, index: usize) -> SubtreeFilter {
    let member = members.member(index);
    match (&pc.closure, member.key.first()) {
        (Some(closure), Some(key)) => SubtreeFilter::Closure {
            closure: closure.clone(),
            key: key.clone(),
        },
        _ => SubtreeFilter::Keys(subtree_keys(members, &[index])),
    }
}

/// Distinct keys of the subtrees of `roots`.
pub fn subtree_keys(members: &HierarchyMembers, roots: &[usize]) -> Vec<Value> {
    let mut keys = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for root in roots {
        for i in members.subtree(*root) {
            if let Some(key) = members.member(i).key.first() {
                if seen.insert(key.clone()) {
                    keys.push(key.clone());
                }
            }
        }
    }
    keys
}
