// tests/olap/parent_child_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{number, TOTAL_SALARY};
use cubist::connection::{CountingConnection, SqlConnection};
use cubist::olap::{QueryResult, Session};

const SHERI: &str = "[Employees].[Sheri Nowmer]";
const MAYA: &str = "[Employees].[Sheri Nowmer].[Maya Gutierrez]";

fn both_sessions() -> [Session; 2] {
    [common::session(), common::closure_session()]
}

fn row_captions(result: &QueryResult) -> Vec<String> {
    result.axes()[1]
        .positions
        .iter()
        .map(|p| p.captions[0].clone())
        .collect()
}

#[test]
fn test_children_follow_seniority() {
    for session in both_sessions() {
        let result = session
            .execute(&format!(
                "SELECT {{[Measures].[Org Salary]}} ON COLUMNS, {{{SHERI}.Children}} ON ROWS FROM [HR]"
            ))
            .unwrap();
        assert_eq!(
            row_captions(&result),
            vec!["Maya Gutierrez", "Michael Spence", "Derrick Whelply"]
        );
        assert_eq!(number(&result, &[0, 0]), 1350.0);
        assert_eq!(number(&result, &[0, 1]), 750.0);
        assert_eq!(number(&result, &[0, 2]), 400.0);
    }
}

#[test]
fn test_members_roll_up_their_subtree() {
    for session in both_sessions() {
        let result = session
            .execute(&format!(
                "SELECT {{[Measures].[Org Salary], [Measures].[Number of Employees]}} ON COLUMNS, \
                 {{[Employees].[All Employees], {SHERI}, {MAYA}, {MAYA}.[Darren Stanz]}} ON ROWS \
                 FROM [HR]"
            ))
            .unwrap();
        assert_eq!(number(&result, &[0, 0]), TOTAL_SALARY);
        assert_eq!(number(&result, &[0, 1]), TOTAL_SALARY);
        assert_eq!(number(&result, &[0, 2]), 1350.0);
        assert_eq!(number(&result, &[0, 3]), 550.0);

        assert_eq!(number(&result, &[1, 1]), 9.0);
        assert_eq!(number(&result, &[1, 2]), 5.0);
        assert_eq!(number(&result, &[1, 3]), 3.0);
        assert_eq!(result.cell(&[0, 1]).formatted_value(), "$3,500.00");
    }
}

#[test]
fn test_distinct_count_over_overlapping_subtrees() {
    for session in both_sessions() {
        let result = session
            .execute(&format!(
                "WITH MEMBER [Employees].[Team] AS 'Aggregate({{{MAYA}, {MAYA}.[Darren Stanz]}})' \
                 MEMBER [Employees].[Two Teams] AS \
                 'Aggregate({{[Employees].[Team], {SHERI}.[Michael Spence]}})' \
                 SELECT {{[Measures].[Number of Employees], [Measures].[Org Salary]}} ON COLUMNS, \
                 {{[Employees].[Team], [Employees].[Two Teams]}} ON ROWS FROM [HR]"
            ))
            .unwrap();
        // Darren's team is inside Maya's: five people, not eight.
        assert_eq!(number(&result, &[0, 0]), 5.0);
        assert_eq!(number(&result, &[0, 1]), 7.0);
        // Sums add up each member of the set.
        assert_eq!(number(&result, &[1, 0]), 1900.0);
        assert_eq!(number(&result, &[1, 1]), 2650.0);
    }
}

#[test]
fn test_descendants_leaves() {
    let session = common::session();
    let result = session
        .execute(&format!(
            "SELECT {{[Measures].[Org Salary]}} ON COLUMNS, \
             {{Descendants({SHERI}, , LEAVES)}} ON ROWS FROM [HR]"
        ))
        .unwrap();
    assert_eq!(
        row_captions(&result),
        vec![
            "Beverly Baker",
            "Pedro Castillo",
            "Jonathan Murraiin",
            "Laurie Borges",
            "Derrick Whelply"
        ]
    );
    let salaries: Vec<f64> = (0..5).map(|r| number(&result, &[0, r])).collect();
    assert_eq!(salaries, vec![100.0, 150.0, 200.0, 250.0, 400.0]);
}

#[test]
fn test_descendants_by_distance() {
    let session = common::session();
    let result = session
        .execute(&format!(
            "SELECT {{Descendants({SHERI}, 2)}} ON COLUMNS FROM [HR]"
        ))
        .unwrap();
    let names: Vec<&str> = result.axes()[0]
        .positions
        .iter()
        .map(|p| p.captions[0].as_str())
        .collect();
    assert_eq!(names, vec!["Darren Stanz", "Jonathan Murraiin", "Laurie Borges"]);
}

#[test]
fn test_navigation() {
    let session = common::session();
    let darren = format!("{MAYA}.[Darren Stanz]");
    let result = session
        .execute(&format!(
            "WITH MEMBER [Measures].[Boss] AS '{darren}.Parent.Name' \
             MEMBER [Measures].[Top] AS 'Ancestor({darren}, 2).Name' \
             MEMBER [Measures].[Next] AS '{MAYA}.NextMember.Name' \
             MEMBER [Measures].[Peers] AS 'Count({darren}.Siblings)' \
             SELECT {{[Measures].[Boss], [Measures].[Top], [Measures].[Next], [Measures].[Peers]}} \
             ON COLUMNS FROM [HR]"
        ))
        .unwrap();
    let formatted: Vec<&str> = result.cells().map(|c| c.formatted_value()).collect();
    assert_eq!(formatted, vec!["Maya Gutierrez", "Sheri Nowmer", "Michael Spence", "2"]);
}

#[test]
fn test_member_tree() {
    let session = common::session();
    let schema = session.schema();
    let hr = schema.cube("HR").unwrap();
    let employees = schema.cube_dimension(hr, "Employees").unwrap().hierarchies[0];
    let members = session.members(employees).unwrap();

    let maya = members.by_unique_name(&MAYA.to_uppercase()).unwrap();
    assert_eq!(members.member(maya).name, "Maya Gutierrez");
    assert_eq!(members.member(maya).depth, 2);
    assert_eq!(members.subtree(maya).len(), 5);
    let ancestors: Vec<&str> = members
        .ancestors(maya)
        .into_iter()
        .map(|i| members.member(i).name.as_str())
        .collect();
    assert_eq!(ancestors, vec!["Sheri Nowmer"]);
}

#[test]
fn test_closure_table_is_used_for_subtrees() {
    let counting = Arc::new(CountingConnection::new(Arc::new(common::foodmart_db())));
    let connection: Arc<dyn SqlConnection> = counting.clone();
    let session = Session::builder(common::schema(true), connection)
        .dialect(common::sqlite())
        .build()
        .unwrap();
    let result = session
        .execute(&format!("SELECT {{{MAYA}}} ON COLUMNS FROM [HR]"))
        .unwrap();
    assert_eq!(number(&result, &[0]), 1350.0);
    assert!(counting.count_matching("\"employee_closure\"") >= 1);

    let (plain, plain_counting) = common::counting_session();
    let result = plain
        .execute(&format!("SELECT {{{MAYA}}} ON COLUMNS FROM [HR]"))
        .unwrap();
    assert_eq!(number(&result, &[0]), 1350.0);
    assert_eq!(plain_counting.count_matching("employee_closure"), 0);
}
