//! Drill-through: the fact rows behind a cell.
//!
//! [`Cell::drill_through_sql`] and [`Cell::drill_through_count`] work on
//! cells of an evaluated query; [`Session::execute_drill_through`] runs a
//! `DRILLTHROUGH` statement against its first cell.
//!
//! [`Cell::drill_through_sql`]: crate::olap::Cell::drill_through_sql
//! [`Cell::drill_through_count`]: crate::olap::Cell::drill_through_count
//! [`Session::execute_drill_through`]: crate::olap::Session::execute_drill_through

mod alias;
mod sql;
mod statement;

pub use alias::AliasAllocator;
pub(crate) use sql::{cell_count, cell_sql, is_drillable};
pub(crate) use statement::execute;

use serde::Serialize;

use crate::connection::Value;

#[derive(Debug, thiserror::Error)]
pub enum DrillThroughError {
    #[error("Can't perform drillthrough operations because 'drillthrough.enabled' is false")]
    Disabled,

    #[error("Calculated member '{0}' cannot be returned by a drillthrough statement")]
    CalculatedMemberInReturn(String),

    #[error("Cannot do drillthrough operations on {0}")]
    NotDrillable(String),

    #[error("Invalid RETURN field '{0}': expected a level or a stored measure")]
    InvalidReturn(String),
}

/// Rows of a `DRILLTHROUGH` statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrillThroughResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// The statement that produced the rows.
    pub sql: String,
}
