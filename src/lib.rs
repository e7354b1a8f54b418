//! # cubist
//!
//! An MDX engine over relational star schemas.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Schema (TOML: cubes, dimensions, measures)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [olap::Session]
//! ┌─────────────────────────────────────────────────────────┐
//! │   MDX text -> mdx parser -> evaluator (axes, cells)      │
//! │   member trees (reader, parent-child)                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!            ┌─────────────┴──────────────┐
//!            ▼ [cache]                    ▼ [drillthrough]
//! ┌──────────────────────┐   ┌──────────────────────────────┐
//! │ aggregation segments │   │ fact rows behind one cell     │
//! └──────────────────────┘   └──────────────────────────────┘
//!                          │
//!                          ▼ [sql::Dialect]
//! ┌─────────────────────────────────────────────────────────┐
//! │            SQL for the detected database product         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod drillthrough;
pub mod mdx;
pub mod olap;
pub mod schema;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{AggregationManager, CellRegion};
    pub use crate::config::Settings;
    pub use crate::connection::{ResultSet, SqlConnection, SqliteConnection, Value};
    pub use crate::drillthrough::{DrillThroughError, DrillThroughResult};
    pub use crate::olap::{Cell, CellValue, OlapError, OlapResult, QueryResult, Session};
    pub use crate::schema::Schema;
    pub use crate::sql::{DatabaseProduct, Dialect, SqlDialect};
}

pub use olap::Session;
pub use schema::Schema;
pub use sql::{DatabaseProduct, Dialect, SqlDialect};
