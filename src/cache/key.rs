//! Segment keys.

use serde::Serialize;

use super::hash::{compute_hash, short_hash};
use crate::schema::{CubeId, HierarchyId};

/// A member, identified by the key path from its top level down.
pub type MemberPath = Vec<String>;

/// One constraint of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Predicate {
    /// Union of the subtrees of members of one hierarchy.
    Members {
        hierarchy: HierarchyId,
        paths: Vec<MemberPath>,
    },
    /// A list of tuples over several hierarchies that is not a cross
    /// product.
    Tuples {
        hierarchies: Vec<HierarchyId>,
        tuples: Vec<Vec<MemberPath>>,
    },
}

impl Predicate {
    pub fn members(hierarchy: HierarchyId, mut paths: Vec<MemberPath>) -> Self {
        paths.sort();
        paths.dedup();
        Predicate::Members { hierarchy, paths }
    }

    pub fn tuples(hierarchies: Vec<HierarchyId>, mut tuples: Vec<Vec<MemberPath>>) -> Self {
        tuples.sort();
        tuples.dedup();
        Predicate::Tuples {
            hierarchies,
            tuples,
        }
    }

    /// Paths this predicate allows on `hierarchy`, `None` if it does not
    /// mention the hierarchy.
    pub fn paths_of(&self, hierarchy: HierarchyId) -> Option<Vec<&MemberPath>> {
        match self {
            Predicate::Members {
                hierarchy: h,
                paths,
            } => (*h == hierarchy).then(|| paths.iter().collect()),
            Predicate::Tuples {
                hierarchies,
                tuples,
            } => {
                let position = hierarchies.iter().position(|h| *h == hierarchy)?;
                Some(tuples.iter().filter_map(|t| t.get(position)).collect())
            }
        }
    }
}

/// The segment groups by one level: one value per child of `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupSpec {
    pub hierarchy: HierarchyId,
    pub level: usize,
    pub parent: MemberPath,
}

/// Identity of a cached aggregate: base cube, measure and sorted
/// constraints. Two requests with equal keys share one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SegmentKey {
    pub cube: CubeId,
    pub measure: String,
    predicates: Vec<Predicate>,
    group: Option<GroupSpec>,
}

impl SegmentKey {
    pub fn new(cube: CubeId, measure: &str) -> Self {
        Self {
            cube,
            measure: measure.to_string(),
            predicates: Vec::new(),
            group: None,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        let at = self.predicates.partition_point(|p| *p < predicate);
        self.predicates.insert(at, predicate);
        self
    }

    pub fn with_group(mut self, group: GroupSpec) -> Self {
        self.group = Some(group);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn group(&self) -> Option<&GroupSpec> {
        self.group.as_ref()
    }

    /// SHA-256 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        compute_hash(self).unwrap_or_else(|_| short_hash(self))
    }
}
