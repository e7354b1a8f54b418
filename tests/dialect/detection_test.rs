// tests/dialect/detection_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use cubist::connection::{DatabaseMetadata, ResultSet, ScriptedConnection, SqlConnection, Value};
use cubist::olap::Session;
use cubist::sql::dialect::CaseFolding;
use cubist::sql::{DatabaseProduct, Dialect, SqlDialect};

fn detect(conn: &ScriptedConnection) -> DatabaseProduct {
    Dialect::detect(conn).unwrap().product()
}

#[test]
fn test_driver_names() {
    let cases = [
        ("MySQL", "5.7.30", DatabaseProduct::MySql),
        ("PostgreSQL", "15.2", DatabaseProduct::Postgresql),
        ("Oracle", "Oracle Database 19c", DatabaseProduct::Oracle),
        ("Microsoft SQL Server", "15.00", DatabaseProduct::MsSql),
        ("Apache Hive", "3.1", DatabaseProduct::Hive),
        ("Impala", "4.0", DatabaseProduct::Impala),
        ("DB2/LINUXX8664", "11.5", DatabaseProduct::Db2),
        ("Apache Derby", "10.14", DatabaseProduct::Derby),
        ("Ingres", "VW 3.0", DatabaseProduct::Vectorwise),
        ("Ingres", "10.2", DatabaseProduct::Unknown),
        ("SQLite", "3.45.0", DatabaseProduct::Sqlite),
        ("Teradata", "16.20", DatabaseProduct::Teradata),
        ("Vertica Database", "12.0", DatabaseProduct::Vertica),
        ("H2", "2.1", DatabaseProduct::Unknown),
    ];
    for (name, version, expected) in cases {
        let conn = ScriptedConnection::new(DatabaseMetadata::new(name, version))
            .with_error("SELECT", "no probe expected");
        assert_eq!(detect(&conn), expected, "{name} {version}");
    }
}

#[test]
fn test_infobright_is_found_by_probing_mysql() {
    let comment = "build number (revision)=IB_4.0.7_r16961_17249(iee - commercial)";
    let conn = ScriptedConnection::new(DatabaseMetadata::new("MySQL", "5.1.40")).with_result(
        "@@version_comment",
        ResultSet::scalar("@@version_comment", Value::from(format!("{comment} Infobright").as_str())),
    );
    assert_eq!(detect(&conn), DatabaseProduct::Infobright);
    assert_eq!(conn.executed(), vec!["SELECT @@version_comment".to_string()]);
}

#[test]
fn test_plain_mysql_stays_mysql() {
    let conn = ScriptedConnection::new(DatabaseMetadata::new("MySQL", "8.0.33")).with_result(
        "@@version_comment",
        ResultSet::scalar("@@version_comment", Value::from("MySQL Community Server - GPL")),
    );
    assert_eq!(detect(&conn), DatabaseProduct::MySql);
}

#[test]
fn test_greenplum_is_found_by_probing_postgres() {
    let conn = ScriptedConnection::new(DatabaseMetadata::new("PostgreSQL", "8.2.15")).with_result(
        "version()",
        ResultSet::scalar(
            "version",
            Value::from("PostgreSQL 8.2.15 (Greenplum Database 4.2.0 build 1)"),
        ),
    );
    assert_eq!(detect(&conn), DatabaseProduct::Greenplum);
    assert_eq!(conn.executed(), vec!["SELECT version()".to_string()]);
}

#[test]
fn test_failed_probe_keeps_base_product() {
    let conn = ScriptedConnection::new(DatabaseMetadata::new("PostgreSQL", "16.1"))
        .with_error("version()", "permission denied");
    assert_eq!(detect(&conn), DatabaseProduct::Postgresql);

    let conn = ScriptedConnection::new(DatabaseMetadata::new("MySQL", "8.0"))
        .with_result("@@version_comment", ResultSet::new(Vec::new(), Vec::new()));
    assert_eq!(detect(&conn), DatabaseProduct::MySql);
}

#[test]
fn test_non_probed_products_run_no_sql() {
    let conn = ScriptedConnection::new(DatabaseMetadata::new("Oracle", "19c"));
    assert_eq!(detect(&conn), DatabaseProduct::Oracle);
    assert!(conn.executed().is_empty());
}

#[test]
fn test_driver_identifier_facts_override_defaults() {
    let mut meta = DatabaseMetadata::new("MySQL", "8.0");
    meta.stores_lower_case_identifiers = true;
    meta.max_column_name_length = Some(48);
    let conn = ScriptedConnection::new(meta).with_error("SELECT", "no probe");
    let dialect = Dialect::detect(&conn).unwrap();
    assert_eq!(dialect.case_folding(), CaseFolding::Lower);
    assert_eq!(dialect.max_column_name_length(), 48);
    assert_eq!(dialect.rectify_case("Store"), "store");

    let mut meta = DatabaseMetadata::new("PostgreSQL", "16");
    meta.stores_upper_case_identifiers = true;
    meta.max_column_name_length = Some(0);
    let conn = ScriptedConnection::new(meta).with_error("SELECT", "no probe");
    let dialect = Dialect::detect(&conn).unwrap();
    assert_eq!(dialect.case_folding(), CaseFolding::Upper);
    // Zero means "no limit reported".
    assert_eq!(dialect.max_column_name_length(), 63);
}

#[test]
fn test_sqlite_connection_is_detected() {
    let conn = common::foodmart_db();
    let dialect = Dialect::detect(&conn).unwrap();
    assert_eq!(dialect.product(), DatabaseProduct::Sqlite);
    assert_eq!(dialect.to_string(), "SQLITE");
}

#[test]
fn test_session_detects_unless_configured() {
    let session = Session::builder(common::schema(false), Arc::new(common::foodmart_db()))
        .build()
        .unwrap();
    assert_eq!(session.dialect().product(), DatabaseProduct::Sqlite);

    let settings = common::settings("[connection]\ndialect = \"postgres\"");
    let conn: Arc<dyn SqlConnection> = Arc::new(ScriptedConnection::new(DatabaseMetadata::new(
        "MySQL", "8.0",
    )));
    let session = Session::builder(common::schema(false), conn)
        .settings(settings)
        .build()
        .unwrap();
    assert_eq!(session.dialect().product(), DatabaseProduct::Postgresql);
}

#[test]
fn test_unknown_configured_dialect_is_rejected() {
    let err = cubist::config::Settings::from_toml("[connection]\ndialect = \"dbase\"").unwrap_err();
    assert_eq!(err.to_string(), "Unsupported dialect: dbase");
}
