//! Serde definitions of the TOML schema file.
//!
//! ```toml
//! name = "FoodMart"
//!
//! [[dimension]]
//! name = "Time"
//! [[dimension.hierarchy]]
//! has_all = false
//! table = "time_by_day"
//! primary_key = "time_id"
//! level = [
//!   { name = "Year", column = "the_year" },
//!   { name = "Quarter", column = "quarter" },
//!   { name = "Month", column = "month_of_year", ordinal_column = "month_of_year" },
//! ]
//!
//! [[cube]]
//! name = "Sales"
//! fact_table = "sales_fact_1997"
//! dimension = [{ name = "Time", source = "Time", foreign_key = "time_id" }]
//! measure = [{ name = "Unit Sales", column = "unit_sales", aggregator = "sum", format_string = "Standard" }]
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaDef {
    pub name: String,

    /// Shared dimensions, usable from several cubes.
    #[serde(default, rename = "dimension")]
    pub dimensions: Vec<DimensionDef>,

    #[serde(default, rename = "cube")]
    pub cubes: Vec<CubeDef>,

    #[serde(default, rename = "virtual_cube")]
    pub virtual_cubes: Vec<VirtualCubeDef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DimensionDef {
    pub name: String,

    /// Name of a shared dimension this usage refers to.
    #[serde(default)]
    pub source: Option<String>,

    /// Fact table column joined to the hierarchy table's primary key.
    #[serde(default)]
    pub foreign_key: Option<String>,

    #[serde(default, rename = "hierarchy")]
    pub hierarchies: Vec<HierarchyDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchyDef {
    /// Defaults to the dimension name.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub has_all: bool,

    #[serde(default)]
    pub all_member_name: Option<String>,

    /// Dimension table; absent for degenerate dimensions on the fact table.
    #[serde(default)]
    pub table: Option<String>,

    #[serde(default)]
    pub primary_key: Option<String>,

    #[serde(default, rename = "level")]
    pub levels: Vec<LevelDef>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LevelDef {
    pub name: String,

    /// Single key column. Ignored when `key_columns` is set.
    #[serde(default)]
    pub column: Option<String>,

    /// Compound key, addressed in MDX as `&[a]&[b]`.
    #[serde(default)]
    pub key_columns: Vec<String>,

    /// Caption column.
    #[serde(default)]
    pub name_column: Option<String>,

    /// Sibling order column.
    #[serde(default)]
    pub ordinal_column: Option<String>,

    /// Makes this a parent-child level.
    #[serde(default)]
    pub parent_column: Option<String>,

    /// Parent value marking a root. NULL always does.
    #[serde(default)]
    pub null_parent_value: Option<String>,

    #[serde(default)]
    pub closure: Option<ClosureDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClosureDef {
    pub table: String,
    pub parent_column: String,
    pub child_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregator {
    Sum,
    Count,
    DistinctCount,
    Min,
    Max,
    Avg,
}

impl Aggregator {
    /// Whether values of disjoint partitions can be combined by this
    /// aggregator's own rollup function.
    pub fn is_additive(self) -> bool {
        matches!(
            self,
            Aggregator::Sum | Aggregator::Count | Aggregator::Min | Aggregator::Max
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MeasureDef {
    pub name: String,

    /// Fact column. `count` without a column counts rows.
    #[serde(default)]
    pub column: Option<String>,

    pub aggregator: Aggregator,

    #[serde(default)]
    pub format_string: Option<String>,

    /// Name of a cell formatter registered with the session.
    #[serde(default)]
    pub formatter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalculatedMemberDef {
    pub name: String,

    #[serde(default = "default_measures")]
    pub dimension: String,

    /// MDX expression.
    pub formula: String,

    #[serde(default)]
    pub format_string: Option<String>,

    #[serde(default)]
    pub solve_order: i32,
}

fn default_measures() -> String {
    "Measures".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CubeDef {
    pub name: String,
    pub fact_table: String,

    #[serde(default, rename = "dimension")]
    pub dimensions: Vec<DimensionDef>,

    #[serde(default, rename = "measure")]
    pub measures: Vec<MeasureDef>,

    #[serde(default, rename = "calculated_member")]
    pub calculated_members: Vec<CalculatedMemberDef>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualMeasureDef {
    pub cube: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualCubeDef {
    pub name: String,

    /// Base cubes, in order. The first one owns constant expressions.
    pub cubes: Vec<String>,

    /// Dimension names, resolved against the base cubes.
    #[serde(default)]
    pub dimensions: Vec<String>,

    #[serde(default, rename = "measure")]
    pub measures: Vec<VirtualMeasureDef>,

    #[serde(default, rename = "calculated_member")]
    pub calculated_members: Vec<CalculatedMemberDef>,
}
