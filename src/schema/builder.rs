//! Compiles [`SchemaDef`] into a [`Schema`].

use std::collections::HashMap;

use tracing::{debug, warn};

use super::def::*;
use super::*;

pub(super) fn build(def: SchemaDef) -> SchemaResult<Schema> {
    let mut builder = Builder {
        shared: def
            .dimensions
            .iter()
            .map(|d| (d.name.to_ascii_lowercase(), d.clone()))
            .collect(),
        conformed: HashMap::new(),
        schema: Schema {
            name: def.name.clone(),
            dimensions: Vec::new(),
            hierarchies: Vec::new(),
            cubes: Vec::new(),
        },
    };
    builder.add_measures_dimension();

    for cube in &def.cubes {
        builder.add_cube(cube)?;
    }
    for cube in &def.virtual_cubes {
        builder.add_virtual_cube(cube)?;
    }

    debug!(
        schema = %builder.schema.name,
        cubes = builder.schema.cubes.len(),
        hierarchies = builder.schema.hierarchies.len(),
        "Schema loaded"
    );
    Ok(builder.schema)
}

struct Builder {
    shared: HashMap<String, DimensionDef>,
    /// Usage name of a shared dimension -> its single instance.
    conformed: HashMap<String, DimensionId>,
    schema: Schema,
}

impl Builder {
    fn add_measures_dimension(&mut self) {
        self.schema.dimensions.push(Dimension {
            id: MEASURES_DIMENSION,
            name: "Measures".into(),
            hierarchies: vec![MEASURES_HIERARCHY],
        });
        self.schema.hierarchies.push(Hierarchy {
            id: MEASURES_HIERARCHY,
            dimension: MEASURES_DIMENSION,
            name: "Measures".into(),
            unique_name: "[Measures]".into(),
            has_all: false,
            all_member_name: String::new(),
            table: None,
            primary_key: None,
            levels: vec![Level {
                name: "MeasuresLevel".into(),
                unique_name: "[Measures].[MeasuresLevel]".into(),
                depth: 0,
                key_columns: Vec::new(),
                name_column: None,
                ordinal_column: None,
                parent_child: None,
            }],
            source_table: String::new(),
        });
    }

    fn add_cube(&mut self, def: &CubeDef) -> SchemaResult<()> {
        if self.schema.cube(&def.name).is_some() {
            return Err(SchemaError::Duplicate {
                what: "cube",
                name: def.name.clone(),
            });
        }
        let id = CubeId(self.schema.cubes.len());

        let mut dimensions = Vec::new();
        for usage in &def.dimensions {
            let dimension = match &usage.source {
                Some(source) => self.shared_dimension(source, &usage.name)?,
                None => self.add_dimension(usage, &def.fact_table)?,
            };
            if dimensions
                .iter()
                .any(|d: &CubeDimension| d.dimension == dimension)
            {
                return Err(SchemaError::Duplicate {
                    what: "dimension",
                    name: usage.name.clone(),
                });
            }
            let needs_key = self.schema.dimension(dimension).hierarchies.iter().any(|h| {
                !self.schema.hierarchy(*h).is_degenerate()
            });
            if needs_key && usage.foreign_key.is_none() {
                return Err(SchemaError::Invalid {
                    what: "dimension usage",
                    name: usage.name.clone(),
                    reason: format!("cube '{}' must give a foreign_key", def.name),
                });
            }
            dimensions.push(CubeDimension {
                dimension,
                foreign_key: usage.foreign_key.clone(),
            });
        }

        let mut measures: Vec<Measure> = Vec::new();
        for m in &def.measures {
            if measures.iter().any(|x| x.name.eq_ignore_ascii_case(&m.name)) {
                return Err(SchemaError::Duplicate {
                    what: "measure",
                    name: m.name.clone(),
                });
            }
            if m.column.is_none() && m.aggregator != Aggregator::Count {
                return Err(SchemaError::Invalid {
                    what: "measure",
                    name: m.name.clone(),
                    reason: "only count measures may omit the column".into(),
                });
            }
            measures.push(Measure {
                name: m.name.clone(),
                unique_name: format!("[Measures].[{}]", m.name),
                column: m.column.clone(),
                aggregator: m.aggregator,
                format_string: m.format_string.clone(),
                formatter: m.formatter.clone(),
                base_cube: id,
            });
        }

        let mut cube = Cube {
            id,
            name: def.name.clone(),
            kind: CubeKind::Base {
                fact_table: def.fact_table.clone(),
            },
            dimensions,
            measures,
            calculated_members: Vec::new(),
        };
        cube.calculated_members = self.calculated_members(&cube, &def.calculated_members)?;
        self.schema.cubes.push(cube);
        Ok(())
    }

    fn add_virtual_cube(&mut self, def: &VirtualCubeDef) -> SchemaResult<()> {
        if self.schema.cube(&def.name).is_some() {
            return Err(SchemaError::Duplicate {
                what: "cube",
                name: def.name.clone(),
            });
        }
        let id = CubeId(self.schema.cubes.len());

        let mut base_cubes = Vec::new();
        for name in &def.cubes {
            let cube = self
                .schema
                .cube(name)
                .filter(|c| !c.is_virtual())
                .ok_or_else(|| SchemaError::UnknownCube(name.clone()))?;
            base_cubes.push(cube.id);
        }
        if base_cubes.is_empty() {
            return Err(SchemaError::Invalid {
                what: "virtual cube",
                name: def.name.clone(),
                reason: "no base cubes".into(),
            });
        }

        // A dimension name resolves to the first base cube that has it;
        // shared dimensions are the same instance in every base cube.
        let mut dimensions = Vec::new();
        for name in &def.dimensions {
            let found = base_cubes.iter().find_map(|cube_id| {
                let cube = self.schema.cube_by_id(*cube_id);
                cube.dimensions
                    .iter()
                    .find(|u| self.schema.dimension(u.dimension).name.eq_ignore_ascii_case(name))
                    .cloned()
            });
            match found {
                Some(usage) => dimensions.push(CubeDimension {
                    dimension: usage.dimension,
                    foreign_key: None,
                }),
                None => return Err(SchemaError::UnknownDimension(name.clone())),
            }
        }

        let mut measures = Vec::new();
        for m in &def.measures {
            let cube = self
                .schema
                .cube(&m.cube)
                .filter(|c| base_cubes.contains(&c.id))
                .ok_or_else(|| SchemaError::UnknownCube(m.cube.clone()))?;
            let measure = cube
                .measure(&m.name)
                .map(|i| cube.measures[i].clone())
                .ok_or_else(|| SchemaError::UnknownMeasure {
                    cube: m.cube.clone(),
                    measure: m.name.clone(),
                })?;
            measures.push(measure);
        }

        let mut cube = Cube {
            id,
            name: def.name.clone(),
            kind: CubeKind::Virtual { base_cubes },
            dimensions,
            measures,
            calculated_members: Vec::new(),
        };
        cube.calculated_members = self.calculated_members(&cube, &def.calculated_members)?;
        self.schema.cubes.push(cube);
        Ok(())
    }

    fn shared_dimension(&mut self, source: &str, usage_name: &str) -> SchemaResult<DimensionId> {
        let key = usage_name.to_ascii_lowercase();
        if let Some(id) = self.conformed.get(&key) {
            return Ok(*id);
        }
        let mut def = self
            .shared
            .get(&source.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SchemaError::UnknownDimension(source.to_string()))?;
        def.name = usage_name.to_string();
        if def.hierarchies.iter().any(|h| h.table.is_none()) {
            return Err(SchemaError::Invalid {
                what: "shared dimension",
                name: source.to_string(),
                reason: "every hierarchy needs a table".into(),
            });
        }
        let id = self.add_dimension(&def, "")?;
        self.conformed.insert(key, id);
        Ok(id)
    }

    fn add_dimension(&mut self, def: &DimensionDef, fact_table: &str) -> SchemaResult<DimensionId> {
        if def.name.eq_ignore_ascii_case("Measures") {
            return Err(SchemaError::Invalid {
                what: "dimension",
                name: def.name.clone(),
                reason: "the name is reserved".into(),
            });
        }
        if def.hierarchies.is_empty() {
            return Err(SchemaError::Invalid {
                what: "dimension",
                name: def.name.clone(),
                reason: "no hierarchies".into(),
            });
        }

        let id = DimensionId(self.schema.dimensions.len());
        let mut hierarchies = Vec::new();
        for h in &def.hierarchies {
            let hierarchy_id = HierarchyId(self.schema.hierarchies.len());
            let hierarchy = build_hierarchy(hierarchy_id, id, &def.name, h, fact_table)?;
            self.schema.hierarchies.push(hierarchy);
            hierarchies.push(hierarchy_id);
        }
        self.schema.dimensions.push(Dimension {
            id,
            name: def.name.clone(),
            hierarchies,
        });
        Ok(id)
    }

    fn calculated_members(
        &self,
        cube: &Cube,
        defs: &[CalculatedMemberDef],
    ) -> SchemaResult<Vec<CalculatedMember>> {
        let mut members: Vec<CalculatedMember> = Vec::new();
        for def in defs {
            let dimension = self
                .schema
                .cube_dimension(cube, &def.dimension)
                .ok_or_else(|| SchemaError::UnknownDimension(def.dimension.clone()))?;
            let hierarchy = self.schema.hierarchy(dimension.hierarchies[0]);
            let formula = mdx::parse_expression(&def.formula).map_err(|source| {
                SchemaError::Formula {
                    member: def.name.clone(),
                    source,
                }
            })?;
            let unique_name = format!("{}.[{}]", hierarchy.unique_name, def.name);
            if members.iter().any(|m| m.unique_name == unique_name) {
                return Err(SchemaError::Duplicate {
                    what: "calculated member",
                    name: unique_name,
                });
            }
            members.push(CalculatedMember {
                name: def.name.clone(),
                unique_name,
                hierarchy: hierarchy.id,
                formula,
                format_string: def.format_string.clone(),
                solve_order: def.solve_order,
                self_referential: false,
            });
        }

        for cycle in deps::find_cycles(&members) {
            let names: Vec<_> = cycle.iter().map(|i| members[*i].unique_name.clone()).collect();
            warn!(cube = %cube.name, members = ?names, "Calculated members reference each other");
            for i in cycle {
                members[i].self_referential = true;
            }
        }
        Ok(members)
    }
}

fn build_hierarchy(
    id: HierarchyId,
    dimension: DimensionId,
    dimension_name: &str,
    def: &HierarchyDef,
    fact_table: &str,
) -> SchemaResult<Hierarchy> {
    let name = def
        .name
        .clone()
        .unwrap_or_else(|| dimension_name.to_string());
    let unique_name = if name.eq_ignore_ascii_case(dimension_name) {
        format!("[{dimension_name}]")
    } else {
        format!("[{dimension_name}.{name}]")
    };

    let invalid = |reason: &str| SchemaError::Invalid {
        what: "hierarchy",
        name: unique_name.clone(),
        reason: reason.to_string(),
    };

    if def.levels.is_empty() {
        return Err(invalid("no levels"));
    }
    if def.table.is_some() && def.primary_key.is_none() {
        return Err(invalid("a hierarchy with a table needs a primary_key"));
    }
    let source_table = match &def.table {
        Some(table) => table.clone(),
        None if !fact_table.is_empty() => fact_table.to_string(),
        None => return Err(invalid("no table")),
    };

    let mut levels = Vec::new();
    for (depth, level) in def.levels.iter().enumerate() {
        let key_columns = if !level.key_columns.is_empty() {
            level.key_columns.clone()
        } else if let Some(column) = &level.column {
            vec![column.clone()]
        } else {
            return Err(SchemaError::Invalid {
                what: "level",
                name: level.name.clone(),
                reason: "needs a column or key_columns".into(),
            });
        };

        let parent_child = match &level.parent_column {
            Some(parent_column) => {
                if def.levels.len() != 1 {
                    return Err(invalid("a parent-child level must be the only level"));
                }
                if key_columns.len() != 1 {
                    return Err(invalid("a parent-child level needs a single key column"));
                }
                Some(ParentChild {
                    parent_column: parent_column.clone(),
                    null_parent_value: level.null_parent_value.clone(),
                    closure: level.closure.clone(),
                })
            }
            None if level.closure.is_some() => {
                return Err(invalid("a closure table needs a parent_column"));
            }
            None => None,
        };

        levels.push(Level {
            name: level.name.clone(),
            unique_name: format!("{unique_name}.[{}]", level.name),
            depth,
            key_columns,
            name_column: level.name_column.clone(),
            ordinal_column: level.ordinal_column.clone(),
            parent_child,
        });
    }

    Ok(Hierarchy {
        id,
        dimension,
        all_member_name: def
            .all_member_name
            .clone()
            .unwrap_or_else(|| format!("All {name}s")),
        name,
        unique_name,
        has_all: def.has_all,
        table: def.table.clone(),
        primary_key: def.primary_key.clone(),
        levels,
        source_table,
    })
}
