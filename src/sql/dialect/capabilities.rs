//! Per-product capability tables.
//!
//! Every [`DatabaseProduct`](super::DatabaseProduct) maps to exactly one
//! `Capabilities` value. Products are described as deltas from [`ANSI`]
//! using struct update syntax, so a new product only lists what differs.

use serde::Serialize;

/// How identifiers are quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteStyle {
    /// `"name"`
    Double,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

/// How the product stores unquoted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaseFolding {
    Upper,
    Lower,
    Preserve,
}

/// How NULL placement is forced in ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NullOrderStyle {
    /// `expr ASC NULLS LAST`
    Ansi,
    /// `ISNULL(expr) ASC, expr ASC`
    IsNullFunction,
    /// `CASE WHEN expr IS NULL THEN 1 ELSE 0 END, expr ASC`
    CaseExpression,
    /// The product cannot force NULL placement; the bare item is emitted.
    Unsupported,
}

/// Regular expression predicate syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegexStyle {
    None,
    /// `src REGEXP 'x'`, case handled with UPPER/BINARY
    MySql,
    /// `src ~ 'x'` / `src ~* 'x'`
    Posix,
    /// `REGEXP_LIKE(src, 'x', 'flags')`
    RegexpLike,
    /// `src REGEXP 'x'` on a Java regex engine, inline flags pass through
    JavaRegexp,
}

/// How literal rows are materialized without a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InlineStyle {
    /// `SELECT 1 AS "a" UNION ALL SELECT 2 AS "a"`
    UnionAll,
    /// `SELECT 1 AS "a" FROM <table> UNION ALL ...`
    UnionAllFrom(&'static str),
    /// `SELECT * FROM (VALUES (1), (2)) AS "t" ("a")`
    Values,
}

/// Static facts about one database product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub quote: QuoteStyle,
    pub case_folding: CaseFolding,
    pub max_column_name_length: usize,
    pub null_order: NullOrderStyle,
    pub regex: RegexStyle,
    pub inline: InlineStyle,
    /// Backslash is an escape character inside string literals.
    pub backslash_escapes: bool,
    /// `DATE 'yyyy-mm-dd'` literals are accepted.
    pub date_literals: bool,

    pub allows_as_for_table_alias: bool,
    pub allows_compound_count_distinct: bool,
    pub allows_count_distinct: bool,
    pub allows_multiple_count_distinct: bool,
    pub allows_ddl: bool,
    pub allows_from_query: bool,
    pub requires_alias_for_from_query: bool,
    pub requires_order_by_alias: bool,
    pub allows_order_by_alias: bool,
    pub requires_union_order_by_expr_to_be_in_select_clause: bool,
    pub supports_group_by_expressions: bool,
    pub supports_grouping_sets: bool,
    pub supports_multi_value_in_expr: bool,
    pub allows_select_not_in_group_by: bool,
    pub requires_having_alias: bool,
}

/// Generic SQL-92 behaviour; also used for unrecognised products.
pub const ANSI: Capabilities = Capabilities {
    quote: QuoteStyle::Double,
    case_folding: CaseFolding::Preserve,
    max_column_name_length: 128,
    null_order: NullOrderStyle::CaseExpression,
    regex: RegexStyle::None,
    inline: InlineStyle::UnionAll,
    backslash_escapes: false,
    date_literals: true,

    allows_as_for_table_alias: true,
    allows_compound_count_distinct: false,
    allows_count_distinct: true,
    allows_multiple_count_distinct: true,
    allows_ddl: true,
    allows_from_query: true,
    requires_alias_for_from_query: false,
    requires_order_by_alias: false,
    allows_order_by_alias: false,
    requires_union_order_by_expr_to_be_in_select_clause: true,
    supports_group_by_expressions: true,
    supports_grouping_sets: false,
    supports_multi_value_in_expr: false,
    allows_select_not_in_group_by: true,
    requires_having_alias: false,
};

/// Microsoft Access: no COUNT(DISTINCT), Jet date literals.
pub const ACCESS: Capabilities = Capabilities {
    max_column_name_length: 64,
    allows_count_distinct: false,
    allows_multiple_count_distinct: false,
    date_literals: false,
    allows_ddl: false,
    ..ANSI
};

/// Apache Derby: upper-case folding, `VALUES` row constructors.
pub const DERBY: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    inline: InlineStyle::Values,
    allows_multiple_count_distinct: false,
    requires_alias_for_from_query: true,
    supports_group_by_expressions: false,
    ..ANSI
};

/// IBM DB2.
pub const DB2: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    max_column_name_length: 30,
    null_order: NullOrderStyle::Ansi,
    inline: InlineStyle::UnionAllFrom("sysibm.sysdummy1"),
    requires_alias_for_from_query: true,
    supports_grouping_sets: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// Greenplum: PostgreSQL descendant without forced null ordering.
pub const GREENPLUM: Capabilities = Capabilities {
    case_folding: CaseFolding::Lower,
    max_column_name_length: 63,
    null_order: NullOrderStyle::Unsupported,
    regex: RegexStyle::Posix,
    allows_multiple_count_distinct: false,
    requires_alias_for_from_query: true,
    supports_grouping_sets: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// Apache Hive: ORDER BY must use select-list aliases.
pub const HIVE: Capabilities = Capabilities {
    quote: QuoteStyle::Backtick,
    case_folding: CaseFolding::Lower,
    max_column_name_length: 128,
    null_order: NullOrderStyle::Unsupported,
    regex: RegexStyle::JavaRegexp,
    backslash_escapes: true,
    date_literals: false,
    allows_as_for_table_alias: false,
    allows_multiple_count_distinct: false,
    allows_ddl: false,
    requires_alias_for_from_query: true,
    requires_order_by_alias: true,
    allows_order_by_alias: true,
    supports_group_by_expressions: false,
    allows_select_not_in_group_by: false,
    ..ANSI
};

/// Cloudera Impala.
pub const IMPALA: Capabilities = Capabilities {
    quote: QuoteStyle::Backtick,
    case_folding: CaseFolding::Lower,
    null_order: NullOrderStyle::Ansi,
    regex: RegexStyle::JavaRegexp,
    backslash_escapes: true,
    allows_multiple_count_distinct: false,
    allows_ddl: false,
    requires_alias_for_from_query: true,
    requires_order_by_alias: true,
    allows_order_by_alias: true,
    allows_select_not_in_group_by: false,
    ..ANSI
};

/// MySQL.
pub const MYSQL: Capabilities = Capabilities {
    quote: QuoteStyle::Backtick,
    max_column_name_length: 64,
    null_order: NullOrderStyle::IsNullFunction,
    regex: RegexStyle::MySql,
    backslash_escapes: true,
    allows_compound_count_distinct: true,
    requires_alias_for_from_query: true,
    allows_order_by_alias: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// Infobright: MySQL wire protocol over a column store with a smaller
/// SQL surface.
pub const INFOBRIGHT: Capabilities = Capabilities {
    allows_compound_count_distinct: false,
    supports_group_by_expressions: false,
    requires_order_by_alias: true,
    requires_having_alias: true,
    regex: RegexStyle::None,
    ..MYSQL
};

/// IBM Informix.
pub const INFORMIX: Capabilities = Capabilities {
    case_folding: CaseFolding::Lower,
    inline: InlineStyle::UnionAllFrom("systables where tabid = 1"),
    requires_alias_for_from_query: true,
    supports_group_by_expressions: false,
    allows_multiple_count_distinct: false,
    ..ANSI
};

/// LucidDB.
pub const LUCIDDB: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    null_order: NullOrderStyle::Ansi,
    inline: InlineStyle::Values,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// Microsoft SQL Server.
pub const MSSQL: Capabilities = Capabilities {
    quote: QuoteStyle::Bracket,
    max_column_name_length: 128,
    date_literals: false,
    supports_grouping_sets: true,
    ..ANSI
};

/// MonetDB.
pub const MONETDB: Capabilities = Capabilities {
    case_folding: CaseFolding::Lower,
    max_column_name_length: 1024,
    null_order: NullOrderStyle::Ansi,
    allows_compound_count_distinct: false,
    requires_alias_for_from_query: true,
    supports_group_by_expressions: false,
    ..ANSI
};

/// HP Neoview: NULL placement cannot be forced.
pub const NEOVIEW: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    null_order: NullOrderStyle::Unsupported,
    inline: InlineStyle::UnionAllFrom("(values(1))"),
    allows_multiple_count_distinct: false,
    requires_alias_for_from_query: true,
    ..ANSI
};

/// IBM Netezza.
pub const NETEZZA: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    null_order: NullOrderStyle::Ansi,
    regex: RegexStyle::RegexpLike,
    requires_alias_for_from_query: true,
    supports_grouping_sets: true,
    ..ANSI
};

/// NuoDB.
pub const NUODB: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    inline: InlineStyle::UnionAllFrom("dual"),
    allows_multiple_count_distinct: false,
    ..ANSI
};

/// Oracle: upper-case folding, 30 character identifiers, no `AS` for
/// table aliases.
pub const ORACLE: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    max_column_name_length: 30,
    null_order: NullOrderStyle::Ansi,
    regex: RegexStyle::RegexpLike,
    inline: InlineStyle::UnionAllFrom("dual"),
    allows_as_for_table_alias: false,
    supports_grouping_sets: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// PostgreSQL.
pub const POSTGRESQL: Capabilities = Capabilities {
    case_folding: CaseFolding::Lower,
    max_column_name_length: 63,
    null_order: NullOrderStyle::Ansi,
    regex: RegexStyle::Posix,
    requires_alias_for_from_query: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};

/// SQLite.
pub const SQLITE: Capabilities = Capabilities {
    max_column_name_length: 1024,
    null_order: NullOrderStyle::Ansi,
    date_literals: false,
    ..ANSI
};

/// Teradata.
pub const TERADATA: Capabilities = Capabilities {
    case_folding: CaseFolding::Upper,
    max_column_name_length: 30,
    allows_multiple_count_distinct: false,
    requires_alias_for_from_query: true,
    supports_grouping_sets: true,
    ..ANSI
};

/// Actian Vectorwise (Ingres VW).
pub const VECTORWISE: Capabilities = Capabilities {
    case_folding: CaseFolding::Lower,
    max_column_name_length: 32,
    requires_alias_for_from_query: true,
    allows_multiple_count_distinct: false,
    ..ANSI
};

/// HP Vertica.
pub const VERTICA: Capabilities = Capabilities {
    null_order: NullOrderStyle::Ansi,
    regex: RegexStyle::RegexpLike,
    requires_alias_for_from_query: true,
    supports_grouping_sets: true,
    supports_multi_value_in_expr: true,
    ..ANSI
};
