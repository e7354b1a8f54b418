//! SQL generation for the star-join and drill-through statements.
//!
//! Expressions ([`expr`]) and SELECTs ([`query`]) lower to [`token`]s,
//! which the [`dialect`] of the live connection spells out.

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;


pub use dialect::{DatabaseProduct, Dialect, SqlDialect};
pub use expr::{
    and_all, col, count_distinct, count_star, func, lit_float, lit_int, lit_null, lit_str, or_all,
    star, table_col, BinaryOperator, Expr, ExprExt, Literal,
};
pub use query::{OrderByExpr, Query, SelectExpr, TableRef};
pub use token::{Token, TokenStream};
