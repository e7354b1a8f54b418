//! Cube schema: the immutable dimensional model a session queries.
//!
//! Schemas are written in TOML (see [`def`]) and compiled by
//! [`Schema::from_toml`] into an arena of dimensions, hierarchies and
//! cubes addressed by small copyable ids.
//!
//! The `Measures` dimension always exists and owns [`MEASURES_HIERARCHY`].
//! Its members differ per cube, so they live on [`Cube::measures`] rather
//! than in the member reader.

mod builder;
pub mod def;
pub mod deps;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::connection::ConnectionError;
use crate::mdx::{self, MdxError};

pub use def::{Aggregator, ClosureDef};

/// Errors raised while loading a schema or reading its members.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown shared dimension '{0}'")]
    UnknownDimension(String),

    #[error("Unknown cube '{0}'")]
    UnknownCube(String),

    #[error("Cube '{cube}' has no measure '{measure}'")]
    UnknownMeasure { cube: String, measure: String },

    #[error("Duplicate {what} '{name}'")]
    Duplicate { what: &'static str, name: String },

    #[error("Invalid {what} '{name}': {reason}")]
    Invalid {
        what: &'static str,
        name: String,
        reason: String,
    },

    #[error("Formula of calculated member '{member}' is invalid: {source}")]
    Formula {
        member: String,
        #[source]
        source: MdxError,
    },

    #[error("Cycle in parent-child hierarchy '{hierarchy}' at member with key '{key}'")]
    ParentChildCycle { hierarchy: String, key: String },

    #[error("Failed to read members of hierarchy '{hierarchy}': {source}")]
    Members {
        hierarchy: String,
        #[source]
        source: ConnectionError,
    },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DimensionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HierarchyId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CubeId(pub usize);

pub const MEASURES_DIMENSION: DimensionId = DimensionId(0);
pub const MEASURES_HIERARCHY: HierarchyId = HierarchyId(0);

#[derive(Debug, Clone)]
pub struct Dimension {
    pub id: DimensionId,
    pub name: String,
    pub hierarchies: Vec<HierarchyId>,
}

impl Dimension {
    pub fn unique_name(&self) -> String {
        format!("[{}]", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct ParentChild {
    pub parent_column: String,
    pub null_parent_value: Option<String>,
    pub closure: Option<ClosureDef>,
}

#[derive(Debug, Clone)]
pub struct Level {
    pub name: String,
    pub unique_name: String,
    /// Position below the all member (0 = top level).
    pub depth: usize,
    pub key_columns: Vec<String>,
    pub name_column: Option<String>,
    pub ordinal_column: Option<String>,
    pub parent_child: Option<ParentChild>,
}

impl Level {
    /// Column holding the caption shown for members of this level.
    pub fn caption_column(&self) -> &str {
        self.name_column
            .as_deref()
            .or_else(|| self.key_columns.first().map(String::as_str))
            .unwrap_or_default()
    }

    pub fn is_parent_child(&self) -> bool {
        self.parent_child.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub id: HierarchyId,
    pub dimension: DimensionId,
    pub name: String,
    /// `[Time]`, or `[Time.Weekly]` for a non-default hierarchy.
    pub unique_name: String,
    pub has_all: bool,
    pub all_member_name: String,
    pub table: Option<String>,
    pub primary_key: Option<String>,
    pub levels: Vec<Level>,
    /// Table members are read from: `table`, or the owning cube's fact
    /// table for a degenerate dimension.
    pub source_table: String,
}

impl Hierarchy {
    pub fn is_measures(&self) -> bool {
        self.id == MEASURES_HIERARCHY
    }

    pub fn is_degenerate(&self) -> bool {
        self.table.is_none()
    }

    pub fn parent_child_level(&self) -> Option<(usize, &Level)> {
        self.levels
            .iter()
            .enumerate()
            .find(|(_, level)| level.is_parent_child())
    }

    pub fn level_by_name(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.name.eq_ignore_ascii_case(name))
    }

    /// Plain name of the hierarchy as written after its dimension.
    pub fn short_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct Measure {
    pub name: String,
    pub unique_name: String,
    pub column: Option<String>,
    pub aggregator: Aggregator,
    pub format_string: Option<String>,
    pub formatter: Option<String>,
    /// Cube whose fact table holds the column.
    pub base_cube: CubeId,
}

#[derive(Debug, Clone)]
pub struct CalculatedMember {
    pub name: String,
    pub unique_name: String,
    pub hierarchy: HierarchyId,
    pub formula: mdx::Expr,
    pub format_string: Option<String>,
    pub solve_order: i32,
    /// Part of a reference cycle among calculated members.
    pub self_referential: bool,
}

#[derive(Debug, Clone)]
pub struct CubeDimension {
    pub dimension: DimensionId,
    /// Fact table column joined to the hierarchy's primary key.
    pub foreign_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CubeKind {
    Base { fact_table: String },
    Virtual { base_cubes: Vec<CubeId> },
}

#[derive(Debug, Clone)]
pub struct Cube {
    pub id: CubeId,
    pub name: String,
    pub kind: CubeKind,
    pub dimensions: Vec<CubeDimension>,
    pub measures: Vec<Measure>,
    pub calculated_members: Vec<CalculatedMember>,
}

impl Cube {
    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, CubeKind::Virtual { .. })
    }

    pub fn fact_table(&self) -> Option<&str> {
        match &self.kind {
            CubeKind::Base { fact_table } => Some(fact_table),
            CubeKind::Virtual { .. } => None,
        }
    }

    /// Cubes whose fact tables answer this cube's measures.
    pub fn base_cubes(&self) -> Vec<CubeId> {
        match &self.kind {
            CubeKind::Base { .. } => vec![self.id],
            CubeKind::Virtual { base_cubes } => base_cubes.clone(),
        }
    }

    pub fn measure(&self, name: &str) -> Option<usize> {
        self.measures
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn usage(&self, dimension: DimensionId) -> Option<&CubeDimension> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }
}

/// A compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    dimensions: Vec<Dimension>,
    hierarchies: Vec<Hierarchy>,
    cubes: Vec<Cube>,
}

impl Schema {
    pub fn from_file<P: AsRef<Path>>(path: P) -> SchemaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> SchemaResult<Self> {
        let def: def::SchemaDef = toml::from_str(text)?;
        builder::build(def)
    }

    pub fn from_def(def: def::SchemaDef) -> SchemaResult<Self> {
        builder::build(def)
    }

    pub fn cubes(&self) -> &[Cube] {
        &self.cubes
    }

    pub fn cube(&self, name: &str) -> Option<&Cube> {
        self.cubes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn cube_by_id(&self, id: CubeId) -> &Cube {
        &self.cubes[id.0]
    }

    pub fn dimension(&self, id: DimensionId) -> &Dimension {
        &self.dimensions[id.0]
    }

    pub fn hierarchy(&self, id: HierarchyId) -> &Hierarchy {
        &self.hierarchies[id.0]
    }

    pub fn hierarchy_count(&self) -> usize {
        self.hierarchies.len()
    }

    /// Hierarchies visible in a cube, `Measures` first.
    pub fn cube_hierarchies(&self, cube: &Cube) -> Vec<HierarchyId> {
        std::iter::once(MEASURES_HIERARCHY)
            .chain(
                cube.dimensions
                    .iter()
                    .flat_map(|usage| self.dimension(usage.dimension).hierarchies.iter().copied()),
            )
            .collect()
    }

    /// The dimension usage through which a base cube's fact table reaches
    /// `hierarchy`, if it does at all.
    pub fn joins(&self, base_cube: CubeId, hierarchy: HierarchyId) -> Option<&CubeDimension> {
        let dimension = self.hierarchy(hierarchy).dimension;
        self.cube_by_id(base_cube).usage(dimension)
    }

    /// Dimension of a cube with the given name.
    pub fn cube_dimension(&self, cube: &Cube, name: &str) -> Option<&Dimension> {
        if name.eq_ignore_ascii_case("Measures") {
            return Some(self.dimension(MEASURES_DIMENSION));
        }
        cube.dimensions
            .iter()
            .map(|usage| self.dimension(usage.dimension))
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }
}
