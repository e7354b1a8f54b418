// tests/olap/calculated_members_test.rs
#[path = "../common/mod.rs"]
mod common;

use common::{number, QUARTERS_1997, UNIT_SALES_1997};
use cubist::olap::EvalError;

const H1: f64 = QUARTERS_1997[0] + QUARTERS_1997[1];

#[test]
fn test_schema_calculated_member() {
    let session = common::session();
    let result = session
        .execute(
            "SELECT {[Measures].[Store Sales], [Measures].[Store Cost], [Measures].[Profit]} \
             ON COLUMNS FROM [Sales] WHERE [Time].[1997].[Q4]",
        )
        .unwrap();
    assert_eq!(number(&result, &[0]), 2.0 * QUARTERS_1997[3]);
    assert_eq!(number(&result, &[2]), QUARTERS_1997[3]);
    assert_eq!(result.cell(&[1]).formatted_value(), "72,024.00");
    assert_eq!(result.cell(&[2]).formatted_value(), "$72,024.00");
}

#[test]
fn test_query_member_with_format_string() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Average Ticket] AS \
             [Measures].[Store Sales] / [Measures].[Sales Count], FORMAT_STRING = '#,##0.0' \
             SELECT {[Measures].[Average Ticket]} ON COLUMNS FROM [Sales]",
        )
        .unwrap();
    // 3 families x 4 quarters x 2 rows
    assert_eq!(number(&result, &[0]), 2.0 * UNIT_SALES_1997 / 24.0);
    assert_eq!(result.cell(&[0]).formatted_value(), "22,231.1");
}

#[test]
fn test_member_on_a_non_measure_dimension() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Time].[H1] AS '[Time].[1997].[Q1] + [Time].[1997].[Q2]' \
             SELECT {[Measures].[Unit Sales], [Measures].[Profit]} ON COLUMNS, \
             {[Time].[H1], [Time].[1997].[Q3]} ON ROWS FROM [Sales]",
        )
        .unwrap();
    assert_eq!(number(&result, &[0, 0]), H1);
    assert_eq!(number(&result, &[1, 0]), H1);
    assert_eq!(number(&result, &[0, 1]), QUARTERS_1997[2]);
    assert_eq!(result.axes()[1].positions[0].unique_names, vec!["[Time].[H1]"]);
}

fn margin_over_h1(h1_order: i32, margin_order: i32) -> f64 {
    let session = common::session();
    let result = session
        .execute(&format!(
            "WITH MEMBER [Time].[H1] AS '[Time].[1997].[Q1] + [Time].[1997].[Q2]', SOLVE_ORDER = {h1_order} \
             MEMBER [Measures].[Margin] AS '[Measures].[Profit] / [Measures].[Store Sales]', \
             SOLVE_ORDER = {margin_order} \
             SELECT {{[Measures].[Margin]}} ON COLUMNS, {{[Time].[H1]}} ON ROWS FROM [Sales]"
        ))
        .unwrap();
    number(&result, &[0, 0])
}

#[test]
fn test_solve_order_decides_which_formula_wins() {
    // The ratio of the sums...
    assert_eq!(margin_over_h1(1, 2), 0.5);
    // ...or the sum of the ratios.
    assert_eq!(margin_over_h1(2, 1), 1.0);
}

#[test]
fn test_self_reference_through_another_period_terminates() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Running] AS \
             'IIf(IsEmpty([Time].CurrentMember.PrevMember), [Measures].[Unit Sales], \
              [Measures].[Unit Sales] + ([Measures].[Running], [Time].CurrentMember.PrevMember))' \
             SELECT {[Measures].[Running]} ON COLUMNS, {[Time].[1997].Children} ON ROWS FROM [Sales]",
        )
        .unwrap();
    let mut expected = 0.0;
    for (q, units) in QUARTERS_1997.iter().enumerate() {
        expected += units;
        assert_eq!(number(&result, &[0, q]), expected, "Q{}", q + 1);
    }
}

#[test]
fn test_distinct_count_over_member_aliases() {
    let session = common::session();
    let plain = session
        .execute(
            "SELECT {[Measures].[Customer Count]} ON COLUMNS FROM [Sales] \
             WHERE {[Time].[1997].[Q1], [Time].[1997].[Q2]}",
        )
        .unwrap();
    assert_eq!(number(&plain, &[0]), 2.0);

    // Q1 and Q2 share their customers, so the alias must not add them twice.
    let aliased = session
        .execute(
            "WITH MEMBER [Time].[Q2x] AS '[Time].[1997].[Q2]' \
             SELECT {[Measures].[Customer Count]} ON COLUMNS FROM [Sales] \
             WHERE {[Time].[1997].[Q1], [Time].[Q2x]}",
        )
        .unwrap();
    assert_eq!(number(&aliased, &[0]), 2.0);

    let nested = session
        .execute(
            "WITH MEMBER [Time].[H1] AS 'Aggregate({[Time].[1997].[Q1], [Time].[1997].[Q2]})' \
             MEMBER [Time].[H1 and Q2] AS 'Aggregate({[Time].[H1], [Time].[1997].[Q2]})' \
             SELECT {[Measures].[Customer Count]} ON COLUMNS, \
             {[Time].[H1], [Time].[H1 and Q2]} ON ROWS FROM [Sales]",
        )
        .unwrap();
    assert_eq!(number(&nested, &[0, 0]), 2.0);
    assert_eq!(number(&nested, &[0, 1]), 2.0);
}

#[test]
fn test_distinct_count_over_a_computed_member_is_an_error() {
    let session = common::session();
    let err = session
        .execute(
            "WITH MEMBER [Time].[Growth] AS '[Time].[1997].[Q2] - [Time].[1997].[Q1]' \
             SELECT {[Measures].[Customer Count]} ON COLUMNS FROM [Sales] \
             WHERE {[Time].[1997].[Q1], [Time].[Growth]}",
        )
        .unwrap_err();
    match err.eval_error() {
        Some(EvalError::NonAdditiveRollup { measure, member }) => {
            assert_eq!(measure, "[Measures].[Customer Count]");
            assert_eq!(member, "[Time].[Growth]");
        }
        other => panic!("expected a rollup error, got {other:?}"),
    }

    // Additive measures still add up the calculated member.
    let result = session
        .execute(
            "WITH MEMBER [Time].[Growth] AS '[Time].[1997].[Q2] - [Time].[1997].[Q1]' \
             SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales] \
             WHERE {[Time].[1997].[Q1], [Time].[Growth]}",
        )
        .unwrap();
    assert_eq!(number(&result, &[0]), QUARTERS_1997[1]);
}

#[test]
fn test_direct_cycle_is_reported() {
    let session = common::session();
    let err = session
        .execute(
            "WITH MEMBER [Measures].[Loop] AS '[Measures].[Loop] + 1' \
             SELECT {[Measures].[Loop]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    match err.eval_error() {
        Some(EvalError::Cycle { member, .. }) => assert_eq!(member, "[Measures].[Loop]"),
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(err
        .to_string()
        .starts_with("Infinite loop while evaluating calculated member '[Measures].[Loop]'"));
}

#[test]
fn test_count_excludeempty_under_its_own_measure_loops() {
    let session = common::session();
    let err = session
        .execute(
            "WITH MEMBER [Measures].[Selling Quarters] AS 'Count([Time].[1998].Children, EXCLUDEEMPTY)' \
             SELECT {[Measures].[Selling Quarters]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(
        matches!(err.eval_error(), Some(EvalError::Cycle { member, .. }) if member == "[Measures].[Selling Quarters]"),
        "{err}"
    );
}

#[test]
fn test_opening_period_of_a_calculated_member_is_itself() {
    let session = common::session();
    let result = session
        .execute(
            "WITH MEMBER [Time].[H1] AS '[Time].[1997].[Q1] + [Time].[1997].[Q2]' \
             MEMBER [Measures].[Opening] AS \
             '([Measures].[Unit Sales], OpeningPeriod([Time].[Quarter], [Time].CurrentMember))' \
             SELECT {[Measures].[Opening]} ON COLUMNS, {[Time].[1997], [Time].[H1]} ON ROWS \
             FROM [Sales]",
        )
        .unwrap();
    assert_eq!(number(&result, &[0, 0]), QUARTERS_1997[0]);
    assert_eq!(number(&result, &[0, 1]), H1);

    // A Time member asking for its own opening period loops.
    let err = session
        .execute(
            "WITH MEMBER [Time].[First] AS \
             '([Measures].[Unit Sales], OpeningPeriod([Time].[Quarter], [Time].CurrentMember))' \
             SELECT {[Time].[First]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(
        matches!(err.eval_error(), Some(EvalError::Cycle { member, .. }) if member == "[Time].[First]"),
        "{err}"
    );
}

#[test]
fn test_depth_limit() {
    let session = common::session_with(common::settings("[query]\nmax_eval_depth = 2"));
    let err = session
        .execute(
            "WITH MEMBER [Measures].[A] AS '[Measures].[B] + 1' \
             MEMBER [Measures].[B] AS '[Measures].[C] + 1' \
             MEMBER [Measures].[C] AS '[Measures].[Unit Sales] + 1' \
             SELECT {[Measures].[A]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(matches!(err.eval_error(), Some(EvalError::TooDeep { depth: 2, .. })), "{err}");
}

#[test]
fn test_invalid_members() {
    let mdx = "WITH MEMBER [Measures].[Bogus Sales] AS \
               'CoalesceEmpty(([Measures].[Unit Sales], [Product].[Bogus]), 0)' \
               SELECT {[Measures].[Bogus Sales]} ON COLUMNS FROM [Sales]";

    let err = common::session().execute(mdx).unwrap_err();
    assert_eq!(
        err.to_string(),
        "MDX object '[Product].[Bogus]' not found in cube 'Sales'"
    );

    let session = common::session_with(common::settings("[query]\nignore_invalid_members = true"));
    let result = session.execute(mdx).unwrap();
    assert_eq!(number(&result, &[0]), 0.0);
}

#[test]
fn test_unknown_cube() {
    let err = common::session()
        .execute("SELECT FROM [Budget]")
        .unwrap_err();
    assert_eq!(err.to_string(), "MDX cube 'Budget' not found");
}
