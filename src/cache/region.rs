//! Cell regions: the unit of cache flushing.

use super::key::{MemberPath, SegmentKey};
use crate::schema::{CubeId, HierarchyId};

/// A set of cells. A segment is flushed if any of its cells lie in the
/// region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRegion {
    /// Every cell of these (base cube, measure) pairs.
    Measures(Vec<(CubeId, String)>),
    /// Cells at or below a member.
    Member {
        hierarchy: HierarchyId,
        path: MemberPath,
    },
    /// Intersection of regions.
    Crossjoin(Vec<CellRegion>),
}

fn related(a: &[String], b: &[String]) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl CellRegion {
    pub fn crossjoin(regions: Vec<CellRegion>) -> Self {
        CellRegion::Crossjoin(regions)
    }

    pub fn intersects(&self, key: &SegmentKey) -> bool {
        match self {
            CellRegion::Measures(measures) => measures
                .iter()
                .any(|(cube, name)| *cube == key.cube && name.eq_ignore_ascii_case(&key.measure)),
            CellRegion::Member { hierarchy, path } => {
                let constrained = key
                    .predicates()
                    .iter()
                    .filter_map(|p| p.paths_of(*hierarchy))
                    .all(|paths| paths.iter().any(|p| related(p, path)));
                let grouped = key
                    .group()
                    .filter(|g| g.hierarchy == *hierarchy)
                    .map(|g| related(&g.parent, path))
                    .unwrap_or(true);
                constrained && grouped
            }
            CellRegion::Crossjoin(regions) => regions.iter().all(|r| r.intersects(key)),
        }
    }
}
