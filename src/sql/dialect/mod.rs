//! SQL dialect definitions and formatting rules.
//!
//! A connection is classified as exactly one [`DatabaseProduct`]. Each
//! product carries a static [`Capabilities`] table, and the
//! [`SqlDialect`] trait turns that table into quoting, capability
//! predicates and SQL generation helpers:
//!
//! - Identifier quoting: `"` (ANSI/Oracle/PostgreSQL), `` ` `` (MySQL, Hive), `[]` (SQL Server)
//! - NULL placement in ORDER BY: `NULLS LAST`, `ISNULL()`, `CASE` or nothing
//! - Regular expressions: `REGEXP`, `~`, `REGEXP_LIKE()` or unsupported
//! - Literal row sets: `UNION ALL`, `FROM dual`, `VALUES`
//! - Numeric type recovery from column metadata
//!
//! # Usage
//!
//! ```ignore
//! use cubist::sql::dialect::{DatabaseProduct, Dialect, SqlDialect};
//!
//! let dialect = Dialect::for_product(DatabaseProduct::MySql);
//! let quoted = dialect.quote_identifier("store");  // `store`
//! ```
//!
//! Live connections go through [`Dialect::detect`], which also applies
//! the identifier case and length limits the driver reports.

mod capabilities;
pub mod helpers;
mod inline;
mod order;
mod product;
mod regexp;
mod types;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub use capabilities::{
    Capabilities, CaseFolding, InlineStyle, NullOrderStyle, QuoteStyle, RegexStyle,
};
pub use inline::InlineType;
pub use product::DatabaseProduct;
pub use types::ColumnType;

use crate::connection::{ColumnMeta, ConnectionError, SqlConnection, Value};

/// Errors raised while classifying a connection.
#[derive(Debug, Error)]
pub enum DialectError {
    #[error("failed to read database metadata: {0}")]
    Connection(#[from] ConnectionError),

    #[error("unknown database product '{0}'")]
    UnknownProduct(String),
}

pub type DialectResult<T> = Result<T, DialectError>;

/// SQL dialect trait - defines how SQL constructs are rendered.
///
/// Every method has a default derived from [`capabilities()`](Self::capabilities);
/// implementors only say which product they are and, optionally, override
/// the connection-derived facts.
pub trait SqlDialect: fmt::Debug {
    fn product(&self) -> DatabaseProduct;

    fn capabilities(&self) -> &'static Capabilities {
        self.product().capabilities()
    }

    /// Dialect name for display/logging.
    fn name(&self) -> &'static str {
        self.product().name()
    }

    fn max_column_name_length(&self) -> usize {
        self.capabilities().max_column_name_length
    }

    fn case_folding(&self) -> CaseFolding {
        self.capabilities().case_folding
    }

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_with(self.capabilities().quote, ident)
    }

    /// Quote a string literal, doubling `'` and, where backslash is an
    /// escape character, `\`.
    fn quote_string_literal(&self, s: &str) -> String {
        helpers::quote_string(s, self.capabilities().backslash_escapes)
    }

    /// Fold an unquoted identifier to the case the database stores it in.
    fn rectify_case(&self, ident: &str) -> String {
        helpers::fold_case(self.case_folding(), ident)
    }

    // =========================================================================
    // Capability Predicates
    // =========================================================================

    fn allows_as_for_table_alias(&self) -> bool {
        self.capabilities().allows_as_for_table_alias
    }

    fn allows_compound_count_distinct(&self) -> bool {
        self.capabilities().allows_compound_count_distinct
    }

    fn allows_count_distinct(&self) -> bool {
        self.capabilities().allows_count_distinct
    }

    fn allows_multiple_count_distinct(&self) -> bool {
        self.capabilities().allows_multiple_count_distinct
    }

    fn allows_ddl(&self) -> bool {
        self.capabilities().allows_ddl
    }

    fn allows_from_query(&self) -> bool {
        self.capabilities().allows_from_query
    }

    fn requires_alias_for_from_query(&self) -> bool {
        self.capabilities().requires_alias_for_from_query
    }

    /// Whether ORDER BY must name select-list aliases instead of repeating
    /// expressions (Hive, Infobright).
    fn requires_order_by_alias(&self) -> bool {
        self.capabilities().requires_order_by_alias
    }

    fn allows_order_by_alias(&self) -> bool {
        self.capabilities().allows_order_by_alias
    }

    fn requires_union_order_by_expr_to_be_in_select_clause(&self) -> bool {
        self.capabilities()
            .requires_union_order_by_expr_to_be_in_select_clause
    }

    fn supports_group_by_expressions(&self) -> bool {
        self.capabilities().supports_group_by_expressions
    }

    fn supports_grouping_sets(&self) -> bool {
        self.capabilities().supports_grouping_sets
    }

    /// Whether `(a, b) IN ((1, 2), (3, 4))` is accepted.
    fn supports_multi_value_in_expr(&self) -> bool {
        self.capabilities().supports_multi_value_in_expr
    }

    fn allows_regular_expression_in_where_clause(&self) -> bool {
        self.capabilities().regex != RegexStyle::None
    }

    fn allows_select_not_in_group_by(&self) -> bool {
        self.capabilities().allows_select_not_in_group_by
    }

    fn requires_having_alias(&self) -> bool {
        self.capabilities().requires_having_alias
    }

    /// Whether `NULLS FIRST/LAST` is native syntax.
    fn supports_nulls_ordering(&self) -> bool {
        self.capabilities().null_order == NullOrderStyle::Ansi
    }

    // =========================================================================
    // SQL Generation
    // =========================================================================

    fn generate_order_item(
        &self,
        expr: &str,
        nullable: bool,
        ascending: bool,
        nulls_last: bool,
    ) -> String {
        order::generate_order_item(self, expr, nullable, ascending, nulls_last)
    }

    fn generate_regular_expression(&self, source: &str, regex: &str) -> Option<String> {
        regexp::generate_regular_expression(self, source, regex)
    }

    fn generate_inline(
        &self,
        names: &[&str],
        types: &[InlineType],
        rows: &[Vec<Option<String>>],
    ) -> String {
        inline::generate_inline(self, names, types, rows)
    }

    fn get_type(&self, columns: &[ColumnMeta], index: usize) -> ColumnType {
        types::get_type(self, columns, index)
    }
}

impl SqlDialect for DatabaseProduct {
    fn product(&self) -> DatabaseProduct {
        *self
    }
}

/// A product plus the facts read from a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    product: DatabaseProduct,
    case_folding: CaseFolding,
    max_column_name_length: usize,
}

impl Dialect {
    /// The product's defaults, without consulting a connection.
    pub fn for_product(product: DatabaseProduct) -> Self {
        let caps = product.capabilities();
        Self {
            product,
            case_folding: caps.case_folding,
            max_column_name_length: caps.max_column_name_length,
        }
    }

    pub fn with_case_folding(mut self, case_folding: CaseFolding) -> Self {
        self.case_folding = case_folding;
        self
    }

    pub fn with_max_column_name_length(mut self, len: usize) -> Self {
        self.max_column_name_length = len;
        self
    }

    /// Classify a live connection.
    ///
    /// The driver's product name decides the family. MySQL connections are
    /// probed with `@@version_comment` to tell Infobright apart, and
    /// PostgreSQL connections with `version()` to tell Greenplum apart; a
    /// failing probe leaves the base product in place.
    pub fn detect(conn: &dyn SqlConnection) -> DialectResult<Self> {
        let meta = conn.metadata()?;
        let mut product =
            DatabaseProduct::from_metadata(&meta.product_name, &meta.product_version);

        match product {
            DatabaseProduct::MySql => {
                if probe_contains(conn, "SELECT @@version_comment", "INFOBRIGHT") {
                    product = DatabaseProduct::Infobright;
                }
            }
            DatabaseProduct::Postgresql => {
                if probe_contains(conn, "SELECT version()", "GREENPLUM") {
                    product = DatabaseProduct::Greenplum;
                }
            }
            _ => {}
        }

        let mut dialect = Dialect::for_product(product);
        if meta.stores_upper_case_identifiers {
            dialect.case_folding = CaseFolding::Upper;
        } else if meta.stores_lower_case_identifiers {
            dialect.case_folding = CaseFolding::Lower;
        }
        if let Some(len) = meta.max_column_name_length.filter(|len| *len > 0) {
            dialect.max_column_name_length = len;
        }

        info!(
            product = %product,
            driver_product = %meta.product_name,
            version = %meta.product_version,
            "detected database dialect"
        );
        Ok(dialect)
    }
}

/// Run a one-row probe and check whether its first value mentions `needle`.
fn probe_contains(conn: &dyn SqlConnection, sql: &str, needle: &str) -> bool {
    match conn.execute_query(sql, Some(1)) {
        Ok(rs) => rs
            .rows
            .first()
            .and_then(|row| row.first())
            .map(|value| match value {
                Value::Text(s) => s.to_uppercase().contains(needle),
                _ => false,
            })
            .unwrap_or(false),
        Err(err) => {
            debug!(sql, error = %err, "dialect probe failed");
            false
        }
    }
}

impl SqlDialect for Dialect {
    fn product(&self) -> DatabaseProduct {
        self.product
    }

    fn max_column_name_length(&self) -> usize {
        self.max_column_name_length
    }

    fn case_folding(&self) -> CaseFolding {
        self.case_folding
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.product.name())
    }
}
