// tests/drillthrough/statement_test.rs
#[path = "../common/mod.rs"]
mod common;

use cubist::drillthrough::DrillThroughError;
use cubist::olap::OlapError;

const DRINK: &str = "SELECT FROM [Sales] WHERE [Product].[Drink]";

fn drink_total() -> f64 {
    common::CELLS[0].iter().sum::<i64>() as f64
}

fn sum_column(rows: &[Vec<cubist::connection::Value>], column: usize) -> f64 {
    rows.iter().filter_map(|r| r[column].as_f64()).sum()
}

#[test]
fn test_all_rows_of_a_cell() {
    let session = common::session();
    let dt = session
        .execute_drill_through(&format!("DRILLTHROUGH {DRINK}"))
        .unwrap();
    assert_eq!(dt.columns, vec!["Product Family", "Year", "Unit Sales"]);
    assert_eq!(dt.rows.len(), 8);
    assert_eq!(sum_column(&dt.rows, 2), drink_total());
    common::validate_sqlite(&dt.sql);
}

#[test]
fn test_maxrows_and_firstrowset_page_through_rows() {
    let session = common::session();
    let first = session
        .execute_drill_through(&format!("DRILLTHROUGH MAXROWS 3 {DRINK}"))
        .unwrap();
    assert_eq!(first.rows.len(), 3);

    let second = session
        .execute_drill_through(&format!("DRILLTHROUGH MAXROWS 3 FIRSTROWSET 4 {DRINK}"))
        .unwrap();
    assert_eq!(second.rows.len(), 3);

    let last = session
        .execute_drill_through(&format!("DRILLTHROUGH MAXROWS 3 FIRSTROWSET 7 {DRINK}"))
        .unwrap();
    assert_eq!(last.rows.len(), 2);

    let paged = sum_column(&first.rows, 2) + sum_column(&second.rows, 2) + sum_column(&last.rows, 2);
    assert_eq!(paged, drink_total());

    let past_the_end = session
        .execute_drill_through(&format!("DRILLTHROUGH FIRSTROWSET 20 {DRINK}"))
        .unwrap();
    assert!(past_the_end.rows.is_empty());
    assert_eq!(past_the_end.columns.len(), 3);
}

#[test]
fn test_largest_maxrows_is_not_an_overflow() {
    let session = common::session();
    let result = session
        .execute_drill_through(&format!(
            "DRILLTHROUGH MAXROWS {} FIRSTROWSET 2 {DRINK}",
            usize::MAX
        ))
        .unwrap();
    assert_eq!(result.rows.len(), 7);
    assert!(sum_column(&result.rows, 2) < drink_total());
}

#[test]
fn test_configured_row_limit() {
    let session = common::session_with(common::settings("[drillthrough]\nmax_rows = 5"));
    let dt = session
        .execute_drill_through(&format!("DRILLTHROUGH {DRINK}"))
        .unwrap();
    assert_eq!(dt.rows.len(), 5);

    // An explicit MAXROWS wins.
    let dt = session
        .execute_drill_through(&format!("DRILLTHROUGH MAXROWS 7 {DRINK}"))
        .unwrap();
    assert_eq!(dt.rows.len(), 7);
}

#[test]
fn test_return_picks_columns() {
    let session = common::session();
    let dt = session
        .execute_drill_through(&format!(
            "DRILLTHROUGH {DRINK} RETURN [Time].[Quarter], [Measures].[Store Sales], [Measures].[Unit Sales]"
        ))
        .unwrap();
    assert_eq!(dt.columns, vec!["Quarter", "Store Sales", "Unit Sales"]);
    assert_eq!(dt.rows.len(), 8);
    assert_eq!(sum_column(&dt.rows, 1), 2.0 * drink_total());
    assert_eq!(sum_column(&dt.rows, 2), drink_total());
    assert!(dt.rows.iter().all(|r| r[0].to_string().starts_with('Q')));
    assert!(dt.sql.contains("ORDER BY \"time_by_day\".\"quarter\" ASC"));
}

#[test]
fn test_return_rejects_calculated_members() {
    let session = common::session();
    let err = session
        .execute_drill_through(&format!("DRILLTHROUGH {DRINK} RETURN [Measures].[Profit]"))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Calculated member '[Measures].[Profit]' cannot be returned by a drillthrough statement"
    );
    assert!(matches!(
        err,
        OlapError::DrillThrough(DrillThroughError::CalculatedMemberInReturn(_))
    ));
}

#[test]
fn test_return_rejects_hierarchies() {
    let session = common::session();
    let err = session
        .execute_drill_through(&format!("DRILLTHROUGH {DRINK} RETURN [Store]"))
        .unwrap_err();
    assert!(matches!(
        err,
        OlapError::DrillThrough(DrillThroughError::InvalidReturn(_))
    ));
    assert!(err.to_string().starts_with("Invalid RETURN field"));
}

#[test]
fn test_negative_maxrows_is_a_syntax_error() {
    let session = common::session();
    let err = session
        .execute_drill_through(
            "DRILLTHROUGH MAXROWS -3\nSELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(matches!(err, OlapError::Mdx(_)));
    assert!(
        err.to_string().starts_with("Syntax error at line 1, column 22, token '-'"),
        "{err}"
    );
}

#[test]
fn test_firstrowset_is_one_based() {
    let session = common::session();
    let err = session
        .execute_drill_through(&format!("DRILLTHROUGH FIRSTROWSET 0 {DRINK}"))
        .unwrap_err();
    assert!(err.to_string().contains("FIRSTROWSET is 1-based"), "{err}");
}

#[test]
fn test_disabled() {
    let session = common::session_with(common::settings("[drillthrough]\nenabled = false"));
    let err = session
        .execute_drill_through(&format!("DRILLTHROUGH {DRINK}"))
        .unwrap_err();
    assert!(matches!(err, OlapError::DrillThrough(DrillThroughError::Disabled)));
}

#[test]
fn test_query_without_cells() {
    let session = common::session();
    let err = session
        .execute_drill_through(
            "DRILLTHROUGH SELECT {Head({[Product].[Drink]}, 0)} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot do drillthrough operations on a query without cells"
    );
}

#[test]
fn test_statement_on_a_non_drillable_cell() {
    let session = common::session();
    let err = session
        .execute_drill_through(
            "DRILLTHROUGH WITH MEMBER [Measures].[Prev] AS '([Measures].[Unit Sales], [Time].PrevMember)' \
             SELECT {[Measures].[Prev]} ON COLUMNS FROM [Sales] WHERE [Time].[1997].[Q2]",
        )
        .unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("Cannot do drillthrough operations on cell ("), "{message}");
    assert!(message.contains("[Measures].[Prev]"), "{message}");
}

#[test]
fn test_first_cell_of_a_grid() {
    let session = common::session();
    let dt = session
        .execute_drill_through(
            "DRILLTHROUGH SELECT {[Time].[1997].Children} ON COLUMNS, \
             {[Product].[Food], [Product].[Drink]} ON ROWS FROM [Sales]",
        )
        .unwrap();
    // Row axis first, then columns.
    assert_eq!(dt.columns, vec!["Product Family", "Year", "Quarter", "Unit Sales"]);
    assert_eq!(sum_column(&dt.rows, 3), common::CELLS[1][0] as f64);
    assert!(dt.rows.iter().all(|r| r[0].to_string() == "Food"));
}

#[test]
fn test_statements_go_to_the_matching_entry_point() {
    let session = common::session();
    assert!(session.execute(&format!("DRILLTHROUGH {DRINK}")).is_err());
    assert!(session.execute_drill_through(DRINK).is_err());
}
