//! Members and the per-hierarchy member arena.

use std::collections::HashMap;

use crate::connection::Value;
use std::cmp::Ordering;

use crate::schema::{Hierarchy, HierarchyId, MEASURES_HIERARCHY};

/// A member as seen by one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberRef {
    /// Entry of a hierarchy's [`HierarchyMembers`] arena. The all member
    /// is stored too.
    Stored { hierarchy: HierarchyId, index: usize },
    /// Stored measure, by position in the cube's measure list.
    Measure(usize),
    /// Calculated member, by position in the query's calculated member table.
    Calculated { hierarchy: HierarchyId, index: usize },
    /// A member that does not exist, e.g. `PrevMember` of the first period.
    Null(HierarchyId),
}

impl MemberRef {
    pub fn stored(hierarchy: HierarchyId, index: usize) -> Self {
        MemberRef::Stored { hierarchy, index }
    }

    pub fn hierarchy(self) -> HierarchyId {
        match self {
            MemberRef::Stored { hierarchy, .. }
            | MemberRef::Calculated { hierarchy, .. }
            | MemberRef::Null(hierarchy) => hierarchy,
            MemberRef::Measure(_) => MEASURES_HIERARCHY,
        }
    }

    pub fn is_calculated(self) -> bool {
        matches!(self, MemberRef::Calculated { .. })
    }
}

/// A tuple: at most one member per hierarchy.
pub type Tuple = Vec<MemberRef>;

#[derive(Debug, Clone)]
pub struct Member {
    /// Caption.
    pub name: String,
    pub unique_name: String,
    /// Key values of the member's own level. Empty for the all member.
    pub key: Vec<Value>,
    /// Level index in the hierarchy; `None` for the all member.
    pub level: Option<usize>,
    /// 0 for the all member, 1 for top-level members, and so on. In a
    /// parent-child hierarchy this is the depth in the tree.
    pub depth: usize,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Captions from the top level down to this member.
    pub path: Vec<String>,
}

impl Member {
    pub fn is_all(&self) -> bool {
        self.level.is_none()
    }
}

/// All members of one hierarchy, read once and then immutable.
#[derive(Debug, Clone)]
pub struct HierarchyMembers {
    pub hierarchy: HierarchyId,
    members: Vec<Member>,
    all: Option<usize>,
    roots: Vec<usize>,
    /// Members per depth, in hierarchical order.
    by_depth: Vec<Vec<usize>>,
    by_unique_name: HashMap<String, usize>,
}

/// A member row before layout. `parent` indexes the same node list.
#[derive(Debug, Clone)]
pub struct MemberNode {
    pub name: String,
    pub key: Vec<Value>,
    pub ordinal: Option<Value>,
    pub level: usize,
    pub parent: Option<usize>,
}

/// Sibling order: ordinal, then key, then caption.
fn sibling_order(a: &MemberNode, b: &MemberNode) -> Ordering {
    let ordinal = match (&a.ordinal, &b.ordinal) {
        (Some(x), Some(y)) => x.sort_cmp(y),
        _ => Ordering::Equal,
    };
    ordinal
        .then_with(|| {
            a.key
                .iter()
                .zip(&b.key)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.name.cmp(&b.name))
}

impl HierarchyMembers {
    /// Lay out `nodes` in preorder below an optional all member, ordering
    /// siblings. Nodes that cannot be reached from a root are dropped;
    /// callers reject cyclic data before this point.
    pub fn build(hierarchy: &Hierarchy, nodes: Vec<MemberNode>) -> Self {
        let mut arena = Self {
            hierarchy: hierarchy.id,
            members: Vec::with_capacity(nodes.len() + 1),
            all: None,
            roots: Vec::new(),
            by_depth: vec![Vec::new()],
            by_unique_name: HashMap::new(),
        };

        let top = if hierarchy.has_all {
            let name = hierarchy.all_member_name.clone();
            arena.push(Member {
                unique_name: format!("{}.[{}]", hierarchy.unique_name, name),
                name,
                key: Vec::new(),
                level: None,
                depth: 0,
                parent: None,
                children: Vec::new(),
                path: Vec::new(),
            });
            arena.all = Some(0);
            Some(0)
        } else {
            None
        };

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            match node.parent {
                Some(p) if p < nodes.len() => children[p].push(i),
                _ => roots.push(i),
            }
        }
        roots.sort_by(|a, b| sibling_order(&nodes[*a], &nodes[*b]));
        for list in &mut children {
            list.sort_by(|a, b| sibling_order(&nodes[*a], &nodes[*b]));
        }

        let mut nodes: Vec<Option<MemberNode>> = nodes.into_iter().map(Some).collect();
        // (node, arena parent, depth); explicit so deep trees stay off the call stack
        let mut stack: Vec<(usize, Option<usize>, usize)> =
            roots.iter().rev().map(|n| (*n, top, 1)).collect();
        while let Some((node_index, parent, depth)) = stack.pop() {
            let Some(node) = nodes[node_index].take() else {
                continue;
            };
            let mut path = parent
                .map(|p| arena.members[p].path.clone())
                .unwrap_or_default();
            path.push(node.name.clone());
            let unique_name = std::iter::once(hierarchy.unique_name.clone())
                .chain(path.iter().map(|p| format!("[{p}]")))
                .collect::<Vec<_>>()
                .join(".");

            let index = arena.push(Member {
                name: node.name,
                unique_name,
                key: node.key,
                level: Some(node.level),
                depth,
                parent,
                children: Vec::new(),
                path,
            });
            if let Some(p) = parent {
                arena.members[p].children.push(index);
            }
            if parent == top {
                arena.roots.push(index);
            }
            for child in children[node_index].iter().rev() {
                stack.push((*child, Some(index), depth + 1));
            }
        }
        arena
    }

    fn push(&mut self, member: Member) -> usize {
        let index = self.members.len();
        while self.by_depth.len() <= member.depth {
            self.by_depth.push(Vec::new());
        }
        self.by_depth[member.depth].push(index);
        self.by_unique_name
            .entry(member.unique_name.to_lowercase())
            .or_insert(index);
        self.members.push(member);
        index
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, index: usize) -> &Member {
        &self.members[index]
    }

    pub fn all(&self) -> Option<usize> {
        self.all
    }

    /// Top-level members, below the all member if there is one.
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// The all member, else the first top-level member.
    pub fn default_member(&self) -> Option<usize> {
        self.all.or_else(|| self.roots.first().copied())
    }

    pub fn at_depth(&self, depth: usize) -> &[usize] {
        self.by_depth.get(depth).map(Vec::as_slice).unwrap_or_default()
    }

    /// Members of a level in hierarchical order. For a parent-child level
    /// that is every non-all member.
    pub fn level_members(&self, level: usize) -> Vec<usize> {
        (0..self.members.len())
            .filter(|i| self.members[*i].level == Some(level))
            .collect()
    }

    pub fn by_unique_name(&self, unique_name: &str) -> Option<usize> {
        self.by_unique_name.get(&unique_name.to_lowercase()).copied()
    }

    /// Child named `name` of `parent`, or top-level member when `parent` is
    /// `None`.
    pub fn child_by_name(&self, parent: Option<usize>, name: &str) -> Option<usize> {
        let candidates = match parent {
            Some(p) => &self.members[p].children,
            None => &self.roots,
        };
        candidates
            .iter()
            .copied()
            .find(|i| self.members[*i].name == name)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|i| self.members[*i].name.eq_ignore_ascii_case(name))
            })
    }

    /// Child of `parent` whose key renders as `key`.
    pub fn child_by_key(&self, parent: Option<usize>, key: &[String]) -> Option<usize> {
        let candidates = match parent {
            Some(p) => &self.members[p].children,
            None => &self.roots,
        };
        candidates.iter().copied().find(|i| {
            let member = &self.members[*i];
            member.key.len() == key.len()
                && member.key.iter().zip(key).all(|(v, k)| v.to_string() == *k)
        })
    }

    /// Any member whose key renders as `key`, searching the whole tree.
    pub fn find_by_key(&self, key: &[String]) -> Option<usize> {
        (0..self.members.len()).find(|i| {
            let member = &self.members[*i];
            !member.is_all()
                && member.key.len() == key.len()
                && member.key.iter().zip(key).all(|(v, k)| v.to_string() == *k)
        })
    }

    /// `index` and everything below it, in preorder.
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend(self.members[i].children.iter().rev());
        }
        out
    }

    /// Ancestors from the top level down to, but excluding, `index`.
    /// The all member is skipped.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = self.members[index].parent;
        while let Some(i) = current {
            if !self.members[i].is_all() {
                chain.push(i);
            }
            current = self.members[i].parent;
        }
        chain.reverse();
        chain
    }

    /// Keys from the top level down to `index`, one element per member
    /// (`a&b` for compound keys). Identifies a member in cache keys and
    /// regions; empty for the all member.
    pub fn key_path(&self, index: usize) -> Vec<String> {
        self.ancestors(index)
            .into_iter()
            .chain([index])
            .map(|i| &self.members[i])
            .filter(|m| !m.is_all())
            .map(|m| {
                m.key
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join("&")
            })
            .collect()
    }

    /// Member `offset` positions away at the same depth.
    pub fn lag(&self, index: usize, offset: i64) -> Option<usize> {
        let peers = self.at_depth(self.members[index].depth);
        let position = peers.iter().position(|i| *i == index)? as i64;
        let target = position - offset;
        if target < 0 {
            return None;
        }
        peers.get(target as usize).copied()
    }

    /// Children of the parent, or the top-level members.
    pub fn siblings(&self, index: usize) -> Vec<usize> {
        match self.members[index].parent {
            Some(p) => self.members[p].children.clone(),
            None => self.roots.clone(),
        }
    }

    /// Whether `ancestor` is `index` or above it.
    pub fn is_ancestor_or_self(&self, ancestor: usize, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.members[i].parent;
        }
        false
    }
}
