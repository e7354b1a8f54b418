// tests/drillthrough/drillthrough_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::validate_sqlite;
use cubist::olap::{OlapError, Session};
use insta::assert_snapshot;

const DRINK_Q1: &str = "SELECT {[Measures].[Unit Sales]} ON COLUMNS, {[Product].[Drink]} ON ROWS \
                        FROM [Sales] WHERE [Time].[1997].[Q1]";

#[test]
fn test_stored_cell_sql() {
    let session = common::session();
    let result = session.execute(DRINK_Q1).unwrap();
    let cell = result.cell(&[0, 0]);
    assert!(cell.can_drill_through());

    let sql = cell.drill_through_sql(false).unwrap().unwrap();
    assert_snapshot!(sql, @r#"
    SELECT
      "product"."product_family" AS "Product Family",
      "time_by_day"."the_year" AS "Year",
      "time_by_day"."quarter" AS "Quarter",
      "sales_fact_1997"."unit_sales" AS "Unit Sales"
    FROM "sales_fact_1997" AS "sales_fact_1997", "time_by_day" AS "time_by_day", "product" AS "product"
    WHERE "sales_fact_1997"."time_id" = "time_by_day"."time_id" AND "time_by_day"."the_year" = 1997 AND "time_by_day"."quarter" = 'Q1' AND "sales_fact_1997"."product_id" = "product"."product_id" AND "product"."product_family" = 'Drink'
    ORDER BY "product"."product_family" ASC, "time_by_day"."the_year" ASC, "time_by_day"."quarter" ASC
    "#);
    validate_sqlite(&sql);
}

#[test]
fn test_count_matches_rows() {
    let session = common::session();
    let result = session.execute(DRINK_Q1).unwrap();
    let cell = result.cell(&[0, 0]);
    assert_eq!(cell.drill_through_count().unwrap(), Some(2));

    let sql = cell.drill_through_sql(false).unwrap().unwrap();
    let rows = session.connection().execute_query(&sql, None).unwrap().rows;
    assert_eq!(rows.len(), 2);
    let units: f64 = rows.iter().filter_map(|r| r[3].as_f64()).sum();
    assert_eq!(units, common::CELLS[0][0] as f64);
}

#[test]
fn test_every_cell_of_a_grid_adds_up() {
    let session = common::session();
    let result = session
        .execute(
            "SELECT {[Time].[1997].Children} ON COLUMNS, \
             {[Product].[Drink], [Product].[Food], [Product].[Non-Consumable]} ON ROWS \
             FROM [Sales]",
        )
        .unwrap();
    for family in 0..3 {
        for quarter in 0..4 {
            let cell = result.cell(&[quarter, family]);
            assert!(cell.can_drill_through());
            let sql = cell.drill_through_sql(false).unwrap().unwrap();
            validate_sqlite(&sql);
            let rs = session.connection().execute_query(&sql, None).unwrap();
            let position = rs.column_names().iter().position(|c| *c == "Unit Sales").unwrap();
            let total: f64 = rs.rows.iter().filter_map(|r| r[position].as_f64()).sum();
            assert_eq!(total, common::CELLS[family][quarter] as f64);
            assert_eq!(cell.drill_through_count().unwrap(), Some(rs.rows.len() as u64));
        }
    }
}

#[test]
fn test_extended_context_adds_every_level() {
    let session = common::session();
    let result = session.execute(DRINK_Q1).unwrap();
    let sql = result.cell(&[0, 0]).drill_through_sql(true).unwrap().unwrap();
    validate_sqlite(&sql);
    for alias in ["Store Country", "Store State", "Store City", "Store Name", "Gender"] {
        assert!(sql.contains(&format!("AS \"{alias}\"")), "{alias} missing:\n{sql}");
    }
    // Levels below the coordinate are not constrained.
    assert!(!sql.contains("\"month_of_year\" ="));

    let rows = session.connection().execute_query(&sql, None).unwrap();
    assert_eq!(rows.rows.len(), 2);
}

#[test]
fn test_calculated_measure_over_stored_measures() {
    let session = common::session();
    let result = session
        .execute("SELECT {[Measures].[Profit]} ON COLUMNS FROM [Sales] WHERE [Time].[1997].[Q4]")
        .unwrap();
    let cell = result.cell(&[0]);
    assert!(cell.can_drill_through());
    let sql = cell.drill_through_sql(false).unwrap().unwrap();
    assert!(sql.contains("AS \"Store Sales\""));
    assert!(sql.contains("AS \"Store Cost\""));
    assert!(!sql.contains("AS \"Profit\""));
    validate_sqlite(&sql);
}

#[test]
fn test_aggregate_of_one_member_drills_like_the_member() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Product].[Drinks] AS 'Aggregate({[Product].[Drink]})' \
             SELECT {[Product].[Drinks], [Product].[Drink]} ON COLUMNS FROM [Sales]",
        )
        .unwrap();
    let calc = result.cell(&[0]);
    let stored = result.cell(&[1]);
    assert_eq!(calc.value(), stored.value());
    assert!(calc.can_drill_through());
    assert_eq!(
        calc.drill_through_sql(false).unwrap(),
        stored.drill_through_sql(false).unwrap()
    );
}

#[test]
fn test_time_shifted_calculation_is_not_drillable() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Prev] AS '([Measures].[Unit Sales], [Time].PrevMember)' \
             SELECT {[Measures].[Prev]} ON COLUMNS FROM [Sales] WHERE [Time].[1997].[Q2]",
        )
        .unwrap();
    let cell = result.cell(&[0]);
    assert_eq!(common::number(&result, &[0]), common::QUARTERS_1997[0]);
    assert!(!cell.can_drill_through());
    assert_eq!(cell.drill_through_sql(false).unwrap(), None);
    assert_eq!(cell.drill_through_count().unwrap(), None);
}

#[test]
fn test_virtual_cube() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Sales per Shipment] AS \
             '[Measures].[Unit Sales] / [Measures].[Units Shipped]' \
             SELECT {[Measures].[Units Shipped], [Measures].[Sales per Shipment]} ON COLUMNS \
             FROM [Warehouse and Sales]",
        )
        .unwrap();

    let shipped = result.cell(&[0]);
    assert_eq!(common::number(&result, &[0]), 600.0);
    assert!(shipped.can_drill_through());
    let sql = shipped.drill_through_sql(false).unwrap().unwrap();
    assert!(sql.contains("FROM \"inventory_fact_1997\""));
    assert!(!sql.contains("customer"));
    assert_eq!(shipped.drill_through_count().unwrap(), Some(3));

    // Measures of two base cubes cannot come from one fact table.
    assert!(!result.cell(&[1]).can_drill_through());
}

#[test]
fn test_compound_slicer() {
    let session = common::session();
    let result = session
        .execute(
            "SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales] \
             WHERE {[Product].[Drink], [Product].[Food]}",
        )
        .unwrap();
    let cell = result.cell(&[0]);
    assert!(cell.can_drill_through());
    let sql = cell.drill_through_sql(false).unwrap().unwrap();
    assert!(sql.contains("\"product\".\"product_family\" IN ('Drink', 'Food')"), "{sql}");
    assert!(sql.contains("AS \"Product Family\""));
    validate_sqlite(&sql);
    assert_eq!(cell.drill_through_count().unwrap(), Some(16));
}

#[test]
fn test_parent_child_member_matches_its_own_key() {
    let session = common::closure_session();
    let result = session
        .execute(
            "SELECT {[Measures].[Org Salary]} ON COLUMNS \
             FROM [HR] WHERE [Employees].[Sheri Nowmer].[Maya Gutierrez]",
        )
        .unwrap();
    // The cell value rolls up the subtree...
    assert_eq!(common::number(&result, &[0]), 1350.0);

    // ...but its fact rows are Maya's own.
    let cell = result.cell(&[0]);
    let sql = cell.drill_through_sql(false).unwrap().unwrap();
    assert!(sql.contains("\"employee\".\"employee_id\" = 4"), "{sql}");
    assert!(!sql.contains("employee_closure"));
    validate_sqlite(&sql);
    assert_eq!(cell.drill_through_count().unwrap(), Some(1));

    let rows = session.connection().execute_query(&sql, None).unwrap();
    assert_eq!(rows.column_names(), vec!["Employee Id", "Year", "Org Salary"]);
    assert_eq!(rows.rows[0][0].to_string(), "Maya Gutierrez");
    assert_eq!(rows.rows[0][2].as_f64(), Some(600.0));
}

#[test]
fn test_long_aliases_are_truncated_and_unique() {
    let session = Session::builder(common::schema(false), Arc::new(common::foodmart_db()))
        .dialect(common::sqlite().with_max_column_name_length(8))
        .build()
        .unwrap();
    let dt = session
        .execute_drill_through(
            "DRILLTHROUGH SELECT FROM [Sales] WHERE [Product].[Drink].[Alcoholic Beverages]",
        )
        .unwrap();
    // The default Time member (1997) constrains the query too.
    assert_eq!(dt.columns, vec!["Product ", "Produc_0", "Year", "Unit Sal"]);
    assert!(dt.columns.iter().all(|c| c.chars().count() <= 8));
    assert_eq!(dt.rows.len(), 8);
    validate_sqlite(&dt.sql);
}

#[test]
fn test_disabled() {
    let session = common::session_with(common::settings("[drillthrough]\nenabled = false"));
    let result = session.execute(DRINK_Q1).unwrap();
    let cell = result.cell(&[0, 0]);
    assert!(!cell.can_drill_through());

    let err = cell.drill_through_sql(false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Can't perform drillthrough operations because 'drillthrough.enabled' is false"
    );
    assert!(matches!(err, OlapError::DrillThrough(_)));
    assert!(cell.drill_through_count().is_err());

    let err = session
        .execute_drill_through("DRILLTHROUGH SELECT FROM [Sales]")
        .unwrap_err();
    assert!(err.to_string().contains("'drillthrough.enabled' is false"));
}

#[test]
fn test_postgres_rendering_of_the_same_cell() {
    let conn: Arc<dyn cubist::connection::SqlConnection> = Arc::new(common::foodmart_db());
    let session = Session::builder(common::schema(false), conn)
        .dialect(cubist::sql::Dialect::for_product(cubist::sql::DatabaseProduct::Postgresql))
        .build()
        .unwrap();
    let result = session.execute(DRINK_Q1).unwrap();
    let sql = result.cell(&[0, 0]).drill_through_sql(false).unwrap().unwrap();
    let parsed = sqlparser::parser::Parser::parse_sql(&sqlparser::dialect::PostgreSqlDialect {}, &sql);
    assert!(parsed.is_ok(), "{sql}");
    assert!(sql.contains("ORDER BY \"product\".\"product_family\" ASC"));
}
