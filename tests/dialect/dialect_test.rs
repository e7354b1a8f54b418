// tests/dialect/dialect_test.rs
#[path = "../common/mod.rs"]
mod common;

use cubist::connection::{ColumnMeta, SqlType};
use cubist::sql::dialect::{CaseFolding, ColumnType, InlineType, NullOrderStyle};
use cubist::sql::{DatabaseProduct, Dialect, SqlDialect};
use sqlparser::dialect::{GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

fn parses(dialect: &dyn sqlparser::dialect::Dialect, sql: &str) {
    if let Err(err) = Parser::parse_sql(dialect, sql) {
        panic!("invalid SQL {sql:?}: {err}");
    }
}

#[test]
fn test_every_product_has_a_distinct_round_tripping_name() {
    let mut names: Vec<&str> = DatabaseProduct::ALL.iter().map(|p| p.name()).collect();
    for product in DatabaseProduct::ALL {
        assert_eq!(product.name().parse::<DatabaseProduct>().unwrap(), product);
        assert_eq!(product.name().to_lowercase().parse::<DatabaseProduct>().unwrap(), product);
    }
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), DatabaseProduct::ALL.len());
}

#[test]
fn test_product_aliases() {
    assert_eq!("postgres".parse::<DatabaseProduct>().unwrap(), DatabaseProduct::Postgresql);
    assert_eq!("pg".parse::<DatabaseProduct>().unwrap(), DatabaseProduct::Postgresql);
    assert_eq!("sqlserver".parse::<DatabaseProduct>().unwrap(), DatabaseProduct::MsSql);
    assert_eq!("MariaDB".parse::<DatabaseProduct>().unwrap(), DatabaseProduct::MySql);
    let err = "dbase".parse::<DatabaseProduct>().unwrap_err();
    assert_eq!(err.to_string(), "unknown database product 'dbase'");
}

#[test]
fn test_capability_matrix_is_consistent() {
    for product in DatabaseProduct::ALL {
        if product.allows_compound_count_distinct() {
            assert!(product.allows_count_distinct(), "{product}");
        }
        if product.requires_having_alias() {
            assert!(product.requires_order_by_alias(), "{product}");
        }
        if product.supports_nulls_ordering() {
            assert_eq!(product.capabilities().null_order, NullOrderStyle::Ansi);
        }
        assert!(product.max_column_name_length() >= 30, "{product}");
        assert_eq!(product.to_string(), product.name());
    }
}

#[test]
fn test_family_variants_differ_from_their_base() {
    let mysql = DatabaseProduct::MySql;
    let infobright = DatabaseProduct::Infobright;
    assert!(infobright.is_mysql_family());
    assert_eq!(infobright.quote_identifier("x"), mysql.quote_identifier("x"));
    assert!(mysql.allows_compound_count_distinct());
    assert!(!infobright.allows_compound_count_distinct());
    assert!(!mysql.requires_order_by_alias());
    assert!(infobright.requires_order_by_alias());
    assert!(infobright.requires_having_alias());
    assert!(!infobright.supports_group_by_expressions());
    assert!(mysql.allows_regular_expression_in_where_clause());
    assert!(!infobright.allows_regular_expression_in_where_clause());
    assert_eq!(infobright.generate_regular_expression("`name`", "Good.*"), None);

    assert!(DatabaseProduct::Greenplum.is_postgres_family());
    assert!(DatabaseProduct::Postgresql.supports_nulls_ordering());
    assert!(!DatabaseProduct::Greenplum.supports_nulls_ordering());
    assert!(!DatabaseProduct::Greenplum.allows_multiple_count_distinct());
}

#[test]
fn test_selected_capabilities() {
    let cases = [
        // product, as-alias, multi-value IN, grouping sets, order-by alias required
        (DatabaseProduct::Oracle, false, true, true, false),
        (DatabaseProduct::Postgresql, true, true, false, false),
        (DatabaseProduct::MySql, true, true, false, false),
        (DatabaseProduct::MsSql, true, false, true, false),
        (DatabaseProduct::Hive, false, false, false, true),
        (DatabaseProduct::Sqlite, true, false, false, false),
        (DatabaseProduct::Unknown, true, false, false, false),
    ];
    for (product, as_alias, multi_in, grouping_sets, order_alias) in cases {
        assert_eq!(product.allows_as_for_table_alias(), as_alias, "{product}");
        assert_eq!(product.supports_multi_value_in_expr(), multi_in, "{product}");
        assert_eq!(product.supports_grouping_sets(), grouping_sets, "{product}");
        assert_eq!(product.requires_order_by_alias(), order_alias, "{product}");
    }
    assert!(!DatabaseProduct::Access.allows_count_distinct());
    assert!(!DatabaseProduct::Hive.allows_ddl());
    assert!(!DatabaseProduct::Hive.allows_select_not_in_group_by());
}

#[test]
fn test_identifier_and_literal_quoting() {
    assert_eq!(DatabaseProduct::Postgresql.quote_identifier("unit sales"), "\"unit sales\"");
    assert_eq!(DatabaseProduct::MySql.quote_identifier("unit sales"), "`unit sales`");
    assert_eq!(DatabaseProduct::MsSql.quote_identifier("unit sales"), "[unit sales]");

    assert_eq!(DatabaseProduct::Oracle.quote_string_literal("O'Hara"), "'O''Hara'");
    assert_eq!(DatabaseProduct::MySql.quote_string_literal(r"a\b"), r"'a\\b'");
    assert_eq!(DatabaseProduct::Postgresql.quote_string_literal(r"a\b"), r"'a\b'");
}

#[test]
fn test_detected_facts_override_product_defaults() {
    let dialect = Dialect::for_product(DatabaseProduct::Postgresql)
        .with_case_folding(CaseFolding::Upper)
        .with_max_column_name_length(10);
    assert_eq!(dialect.rectify_case("store_id"), "STORE_ID");
    assert_eq!(dialect.max_column_name_length(), 10);
    // Capabilities still come from the product.
    assert!(dialect.supports_nulls_ordering());
    assert_eq!(dialect.quote_identifier("a"), "\"a\"");
}

#[test]
fn test_order_items_by_null_style() {
    let item = |p: DatabaseProduct| p.generate_order_item("c", true, true, true);
    assert_eq!(item(DatabaseProduct::Postgresql), "c ASC NULLS LAST");
    assert_eq!(item(DatabaseProduct::MySql), "ISNULL(c) ASC, c ASC");
    assert_eq!(
        item(DatabaseProduct::MsSql),
        "CASE WHEN c IS NULL THEN 1 ELSE 0 END, c ASC"
    );
    assert_eq!(item(DatabaseProduct::Hive), "c ASC");
    assert_eq!(item(DatabaseProduct::Greenplum), "c ASC");

    assert_eq!(
        DatabaseProduct::Oracle.generate_order_item("c", true, false, false),
        "c DESC NULLS FIRST"
    );
    assert_eq!(
        DatabaseProduct::MySql.generate_order_item("c", true, false, false),
        "ISNULL(c) DESC, c DESC"
    );
}

#[test]
fn test_order_items_are_valid_sql() {
    let pg = PostgreSqlDialect {};
    let mysql = MySqlDialect {};
    parses(
        &pg,
        &format!(
            "SELECT c FROM t ORDER BY {}",
            DatabaseProduct::Postgresql.generate_order_item("c", true, true, true)
        ),
    );
    parses(
        &mysql,
        &format!(
            "SELECT c FROM t ORDER BY {}",
            DatabaseProduct::MySql.generate_order_item("c", true, true, false)
        ),
    );
    let generic = GenericDialect {};
    parses(
        &generic,
        &format!(
            "SELECT c FROM t ORDER BY {}",
            DatabaseProduct::MsSql.generate_order_item("c", true, false, true)
        ),
    );
}

#[test]
fn test_regular_expressions() {
    assert_eq!(
        DatabaseProduct::MySql
            .generate_regular_expression("`name`", "(?i).*beer.*")
            .as_deref(),
        Some("UPPER(`name`) REGEXP UPPER('.*beer.*')")
    );
    assert_eq!(
        DatabaseProduct::Oracle
            .generate_regular_expression("\"name\"", "Good.*")
            .as_deref(),
        Some("REGEXP_LIKE(\"name\", 'Good.*', 'c')")
    );
    assert_eq!(DatabaseProduct::Postgresql.generate_regular_expression("c", "(unclosed"), None);
    assert_eq!(DatabaseProduct::MsSql.generate_regular_expression("c", "a.*"), None);
}

#[test]
fn test_inline_rows_parse() {
    let rows = vec![
        vec![Some("Food".to_string()), Some("12".to_string())],
        vec![Some("Drink".to_string()), None],
    ];
    let types = [InlineType::String, InlineType::Numeric];

    let sql = DatabaseProduct::Postgresql.generate_inline(&["family", "n"], &types, &rows);
    insta::assert_snapshot!(sql, @r#"SELECT 'Food' AS "family", 12 AS "n" UNION ALL SELECT 'Drink' AS "family", NULL AS "n""#);
    parses(&PostgreSqlDialect {}, &sql);

    let sql = DatabaseProduct::MySql.generate_inline(&["family", "n"], &types, &rows);
    parses(&MySqlDialect {}, &sql);

    let sql = DatabaseProduct::Sqlite.generate_inline(&["family", "n"], &types, &rows);
    common::validate_sqlite(&sql);

    let empty = DatabaseProduct::Sqlite.generate_inline(&["family"], &[InlineType::String], &[]);
    common::validate_sqlite(&empty);
}

#[test]
fn test_inline_rows_run_on_sqlite() {
    use cubist::connection::{SqlConnection, SqliteConnection, Value};

    let rows = vec![
        vec![Some("a".to_string()), Some("1".to_string())],
        vec![Some("b".to_string()), Some("2.5".to_string())],
    ];
    let sql = DatabaseProduct::Sqlite.generate_inline(
        &["k", "v"],
        &[InlineType::String, InlineType::Numeric],
        &rows,
    );
    let conn = SqliteConnection::open_in_memory().unwrap();
    let rs = conn.execute_query(&sql, None).unwrap();
    assert_eq!(rs.column_names(), vec!["k", "v"]);
    assert_eq!(rs.rows.len(), 2);
    assert_eq!(rs.rows[1][0], Value::Text("b".into()));
    assert_eq!(rs.rows[1][1].as_f64(), Some(2.5));
}

#[test]
fn test_column_types_from_metadata() {
    let columns = vec![
        ColumnMeta::new("c0", SqlType::Integer),
        ColumnMeta::new("m0", SqlType::Numeric).with_precision(0).with_scale(0),
        ColumnMeta::new("c1", SqlType::Numeric).with_precision(0).with_scale(0),
        ColumnMeta::new("m1", SqlType::Decimal).with_precision(10).with_scale(2),
        ColumnMeta::new("c2", SqlType::Varchar),
    ];
    let oracle = DatabaseProduct::Oracle;
    assert_eq!(oracle.get_type(&columns, 0), ColumnType::Int);
    assert_eq!(oracle.get_type(&columns, 1), ColumnType::Double);
    assert_eq!(oracle.get_type(&columns, 2), ColumnType::Int);
    assert_eq!(oracle.get_type(&columns, 3), ColumnType::Double);
    assert_eq!(oracle.get_type(&columns, 4), ColumnType::Object);
    assert_eq!(oracle.get_type(&columns, 9), ColumnType::Object);

    let netezza = DatabaseProduct::Netezza;
    assert_eq!(netezza.get_type(&columns, 1), ColumnType::Object);
    assert_eq!(netezza.get_type(&columns, 2), ColumnType::Int);

    // Elsewhere precision and scale decide.
    assert_eq!(DatabaseProduct::Postgresql.get_type(&columns, 1), ColumnType::Int);
}

#[test]
fn test_capabilities_serialize() {
    let json = serde_json::to_value(DatabaseProduct::Oracle.capabilities()).unwrap();
    assert_eq!(json["max_column_name_length"], 30);
    assert_eq!(json["allows_as_for_table_alias"], false);
}
