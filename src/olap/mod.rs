//! The multidimensional engine.
//!
//! A [`Session`] owns the schema, the connection, its [`Dialect`], the
//! settings and the aggregation cache. [`Session::execute`] parses an MDX
//! `SELECT`, evaluates its axes and every cell, and returns a
//! [`QueryResult`] whose [`Cell`]s answer drill-through requests.
//!
//! ```text
//! MDX text -> mdx::parse_statement -> QueryState (cube, calculated members, named sets)
//!          -> Evaluator (axes, slicer, cells) -> AggregationManager -> StarQuery SQL
//! ```
//!
//! [`Dialect`]: crate::sql::Dialect

pub mod context;
pub(crate) mod eval;
pub mod format;
mod functions;
pub mod member;
pub mod parent_child;
pub mod reader;
mod resolve;
pub mod result;
pub mod session;
pub mod star;
pub mod udf;
pub mod value;

pub use context::{Context, TupleList};
pub use format::{formatter_fn, format_value, CellFormatter};
pub use member::{HierarchyMembers, MemberRef, Tuple};
pub use result::{AxisResult, Cell, Position, QueryResult};
pub use session::{Session, SessionBuilder};
pub use udf::{udf_fn, UdfType, UserDefinedFunction};
pub use value::CellValue;

use crate::cache::CacheError;
use crate::config::SettingsError;
use crate::connection::ConnectionError;
use crate::drillthrough::DrillThroughError;
use crate::mdx::MdxError;
use crate::schema::SchemaError;
use crate::sql::dialect::DialectError;

/// Errors raised while evaluating a query.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("MDX object '{name}' not found in cube '{cube}'")]
    MemberNotFound { name: String, cube: String },

    #[error("MDX cube '{0}' not found")]
    CubeNotFound(String),

    #[error("Wrong number of values in member key '{member}': expected {expected}, got {got}")]
    KeyArity {
        member: String,
        expected: usize,
        got: usize,
    },

    #[error(
        "Infinite loop while evaluating calculated member '{member}'; context stack is {}",
        .stack.join(" -> ")
    )]
    Cycle { member: String, stack: Vec<String> },

    #[error("Cannot roll up non-additive measure '{measure}' over calculated member '{member}'")]
    NonAdditiveRollup { measure: String, member: String },

    #[error("Evaluation of '{member}' exceeded the maximum depth of {depth}")]
    TooDeep { member: String, depth: usize },

    #[error("No function matches signature '{function}': {message}")]
    UdfSignature { function: String, message: String },

    #[error("No function matches signature '{0}'")]
    UnknownFunction(String),

    #[error("{0}")]
    Type(String),

    #[error(transparent)]
    Mdx(#[from] MdxError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Any error the engine can return to a caller.
#[derive(Debug, thiserror::Error)]
pub enum OlapError {
    #[error(transparent)]
    Mdx(#[from] MdxError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    DrillThrough(#[from] DrillThroughError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error(transparent)]
    Config(#[from] SettingsError),
}

impl OlapError {
    /// The evaluation error underneath, looking through the wrappers.
    pub fn eval_error(&self) -> Option<&EvalError> {
        match self {
            OlapError::Eval(e) => Some(e),
            _ => None,
        }
    }
}

pub type OlapResult<T> = Result<T, OlapError>;
