//! Reads hierarchy members from the database, once per hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use super::member::{HierarchyMembers, MemberNode};
use super::parent_child::{self, ParentChildRow};
use crate::connection::{SqlConnection, Value};
use crate::schema::{Hierarchy, HierarchyId, Level, Schema, SchemaError, SchemaResult};
use crate::sql::{col, Dialect, Query, TableRef};

/// Lazily loaded, then immutable, member trees of a schema.
pub struct MemberReader {
    schema: Arc<Schema>,
    connection: Arc<dyn SqlConnection>,
    dialect: Dialect,
    loaded: Vec<OnceCell<Arc<HierarchyMembers>>>,
}

/// Result column positions of one level.
struct LevelColumns {
    keys: Vec<usize>,
    name: Option<usize>,
    ordinal: Option<usize>,
}

impl MemberReader {
    pub fn new(schema: Arc<Schema>, connection: Arc<dyn SqlConnection>, dialect: Dialect) -> Self {
        let loaded = (0..schema.hierarchy_count()).map(|_| OnceCell::new()).collect();
        Self {
            schema,
            connection,
            dialect,
            loaded,
        }
    }

    /// Members of `hierarchy`. Concurrent first calls run one load.
    pub fn members(&self, hierarchy: HierarchyId) -> SchemaResult<Arc<HierarchyMembers>> {
        let h = self.schema.hierarchy(hierarchy);
        let cell = &self.loaded[hierarchy.0];
        cell.get_or_try_init(|| self.load(h).map(Arc::new))
            .cloned()
    }

    fn load(&self, h: &Hierarchy) -> SchemaResult<HierarchyMembers> {
        if h.is_measures() {
            return Ok(HierarchyMembers::build(h, Vec::new()));
        }
        let nodes = match h.parent_child_level() {
            Some((index, level)) => self.read_parent_child(h, index, level)?,
            None => self.read_levels(h)?,
        };
        let members = HierarchyMembers::build(h, nodes);
        debug!(hierarchy = %h.unique_name, members = members.len(), "read members");
        Ok(members)
    }

    fn run(&self, h: &Hierarchy, query: Query) -> SchemaResult<Vec<Vec<Value>>> {
        let sql = query.to_sql(&self.dialect);
        debug!(hierarchy = %h.unique_name, %sql, "reading members");
        self.connection
            .execute_query(&sql, None)
            .map(|rs| rs.rows)
            .map_err(|source| SchemaError::Members {
                hierarchy: h.unique_name.clone(),
                source,
            })
    }

    fn read_levels(&self, h: &Hierarchy) -> SchemaResult<Vec<MemberNode>> {
        let mut select = Vec::new();
        let mut push = |column: &str| {
            select.push(col(column));
            select.len() - 1
        };
        let layout: Vec<LevelColumns> = h
            .levels
            .iter()
            .map(|level| LevelColumns {
                keys: level.key_columns.iter().map(|c| push(c)).collect(),
                name: level.name_column.as_deref().map(&mut push),
                ordinal: level.ordinal_column.as_deref().map(&mut push),
            })
            .collect();

        let query = Query::new()
            .select(select)
            .distinct()
            .from(TableRef::new(&h.source_table));
        let rows = self.run(h, query)?;

        let mut nodes: Vec<MemberNode> = Vec::new();
        let mut seen: HashMap<(Option<usize>, Vec<Value>), usize> = HashMap::new();
        for row in rows {
            let mut parent = None;
            for (level, columns) in layout.iter().enumerate() {
                let key: Vec<Value> = columns.keys.iter().map(|i| row[*i].clone()).collect();
                let index = match seen.get(&(parent, key.clone())) {
                    Some(index) => *index,
                    None => {
                        nodes.push(MemberNode {
                            name: caption(&row, columns, &key),
                            key: key.clone(),
                            ordinal: columns.ordinal.map(|i| row[i].clone()),
                            level,
                            parent,
                        });
                        seen.insert((parent, key), nodes.len() - 1);
                        nodes.len() - 1
                    }
                };
                parent = Some(index);
            }
        }
        Ok(nodes)
    }

    fn read_parent_child(
        &self,
        h: &Hierarchy,
        index: usize,
        level: &Level,
    ) -> SchemaResult<Vec<MemberNode>> {
        let Some(pc) = &level.parent_child else {
            return Ok(Vec::new());
        };
        let key_column = level.key_columns.first().map(String::as_str).unwrap_or_default();
        let mut select = vec![col(key_column), col(&pc.parent_column)];
        if let Some(name) = &level.name_column {
            select.push(col(name));
        }
        if let Some(ordinal) = &level.ordinal_column {
            select.push(col(ordinal));
        }
        let name_at = level.name_column.as_ref().map(|_| 2);
        let ordinal_at = level
            .ordinal_column
            .as_ref()
            .map(|_| if name_at.is_some() { 3 } else { 2 });

        let query = Query::new()
            .select(select)
            .distinct()
            .from(TableRef::new(&h.source_table));
        let rows = self
            .run(h, query)?
            .into_iter()
            .map(|row| ParentChildRow {
                caption: name_at
                    .map(|i| row[i].to_string())
                    .unwrap_or_else(|| row[0].to_string()),
                ordinal: ordinal_at.map(|i| row[i].clone()),
                key: row[0].clone(),
                parent: row[1].clone(),
            })
            .collect();
        parent_child::build_tree(h, index, pc, rows)
    }
}

fn caption(row: &[Value], columns: &LevelColumns, key: &[Value]) -> String {
    match columns.name {
        Some(i) => row[i].to_string(),
        None => key
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    }
}
