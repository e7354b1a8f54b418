//! MDX front end: lexer, AST and parser for `SELECT`, `WITH MEMBER`/`WITH SET`
//! and `DRILLTHROUGH` statements.
//!
//! # Example
//!
//! ```ignore
//! use cubist::mdx;
//!
//! let stmt = mdx::parse_statement(
//!     "select {[Measures].[Unit Sales]} on columns from [Sales] where [Time].[1997]",
//! )?;
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use parser::{parse_expression, parse_statement};

/// Errors raised while parsing MDX or resolving its names.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MdxError {
    #[error("Syntax error at line {line}, column {column}, token '{token}': {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
        token: String,
    },

    #[error(
        "Axis numbers specified in a query must be sequentially specified, \
         and cannot contain gaps. Axis {ordinal} ({name}) is missing."
    )]
    AxisGap { ordinal: usize, name: String },

    #[error("Duplicate axis name '{name}' at line {line}, column {column}")]
    DuplicateAxis {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("The '{name}' dimension contains more than one hierarchy, therefore the hierarchy must be explicitly specified (line {line}, column {column})")]
    AmbiguousHierarchy {
        name: String,
        line: usize,
        column: usize,
    },
}

pub type MdxResult<T> = Result<T, MdxError>;
