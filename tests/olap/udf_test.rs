// tests/olap/udf_test.rs
#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{number, UNIT_SALES_1997};
use cubist::olap::{formatter_fn, udf_fn, CellValue, EvalError, Session, UdfType};
use cubist::schema::Schema;

const MINI: &str = r##"
name = "Mini"

[[dimension]]
name = "Product"
[[dimension.hierarchy]]
table = "product"
primary_key = "product_id"
level = [{ name = "Product Family", column = "product_family" }]

[[cube]]
name = "Sales"
fact_table = "sales_fact_1997"
dimension = [{ name = "Product", source = "Product", foreign_key = "product_id" }]
measure = [
  { name = "Unit Sales", column = "unit_sales", aggregator = "sum", formatter = "units" },
  { name = "Store Sales", column = "store_sales", aggregator = "sum", format_string = "#,###" },
]
"##;

fn plus_one() -> Arc<dyn cubist::olap::UserDefinedFunction> {
    udf_fn("PlusOne", &[UdfType::Numeric], UdfType::Numeric, |args| {
        Ok(CellValue::Number(args[0].as_f64().unwrap_or(0.0) + 1.0))
    })
}

fn session_with_udfs() -> Session {
    Session::builder(common::schema(false), Arc::new(common::foodmart_db()))
        .dialect(common::sqlite())
        .udf(plus_one())
        .udf(udf_fn("Fails", &[UdfType::Any], UdfType::Any, |_| {
            Err("no data for you".to_string())
        }))
        .udf(udf_fn(
            "Shout",
            &[UdfType::String],
            UdfType::String,
            |args| Ok(CellValue::Text(args[0].to_string().to_uppercase())),
        ))
        .build()
        .unwrap()
}

#[test]
fn test_udf_is_called_by_name() {
    let session = session_with_udfs();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Next] AS 'PlusOne([Measures].[Unit Sales])' \
             MEMBER [Measures].[Lower] AS 'plusone(1)' \
             MEMBER [Measures].[Loud] AS 'Shout([Product].[Drink].Name)' \
             SELECT {[Measures].[Next], [Measures].[Lower], [Measures].[Loud]} ON COLUMNS FROM [Sales]",
        )
        .unwrap();
    assert_eq!(number(&result, &[0]), UNIT_SALES_1997 + 1.0);
    assert_eq!(number(&result, &[1]), 2.0);
    assert_eq!(result.cell(&[2]).value(), &CellValue::Text("DRINK".into()));
}

#[test]
fn test_failing_udf_becomes_an_error_cell() {
    let session = session_with_udfs();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Broken] AS 'Fails(1)' \
             SELECT {[Measures].[Broken], [Measures].[Unit Sales]} ON COLUMNS FROM [Sales]",
        )
        .unwrap();
    let broken = result.cell(&[0]);
    assert!(broken.is_error());
    assert_eq!(broken.formatted_value(), "#ERR: no data for you");
    // The rest of the query still runs.
    assert_eq!(number(&result, &[1]), UNIT_SALES_1997);
    assert!(!result.cell(&[1]).is_error());
}

#[test]
fn test_arguments_are_checked() {
    let session = session_with_udfs();
    let err = session
        .execute(
            "WITH MEMBER [Measures].[Bad] AS 'PlusOne(\"one\")' \
             SELECT {[Measures].[Bad]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(matches!(err.eval_error(), Some(EvalError::UdfSignature { .. })), "{err}");
    assert!(err
        .to_string()
        .starts_with("No function matches signature 'PlusOne(Numeric)'"));

    let err = session
        .execute(
            "WITH MEMBER [Measures].[Bad] AS 'PlusOne(1, 2)' \
             SELECT {[Measures].[Bad]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert!(err.to_string().contains("expects 1 argument(s), got 2"), "{err}");
}

#[test]
fn test_empty_argument_is_accepted() {
    let session = session_with_udfs();
    let result = session
        .execute(
            "WITH MEMBER [Measures].[Next] AS 'PlusOne([Measures].[Unit Sales])' \
             SELECT {[Measures].[Next]} ON COLUMNS FROM [Sales] WHERE [Time].[1998]",
        )
        .unwrap();
    assert_eq!(number(&result, &[0]), 1.0);
}

#[test]
fn test_unknown_function() {
    let err = common::session()
        .execute(
            "WITH MEMBER [Measures].[X] AS 'Nope(1)' \
             SELECT {[Measures].[X]} ON COLUMNS FROM [Sales]",
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "No function matches signature 'Nope(1)'");
}

#[test]
fn test_named_formatter() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let session = Session::builder(
        Schema::from_toml(MINI).unwrap(),
        Arc::new(common::foodmart_db()),
    )
    .dialect(common::sqlite())
    .formatter(
        "units",
        formatter_fn(move |value| {
            seen.fetch_add(1, Ordering::SeqCst);
            match value {
                CellValue::Number(n) => Ok(format!("{n} units")),
                CellValue::Empty => Ok("none".to_string()),
                other => Err(format!("cannot format '{other}'")),
            }
        }),
    )
    .build()
    .unwrap();

    let result = session
        .execute(
            "SELECT {[Measures].[Unit Sales], [Measures].[Store Sales]} ON COLUMNS, \
             {[Product].[Drink]} ON ROWS FROM [Sales]",
        )
        .unwrap();
    let drink: i64 = common::CELLS[0].iter().sum();
    assert_eq!(result.cell(&[0, 0]).formatted_value(), format!("{drink} units"));
    assert_eq!(result.cell(&[1, 0]).formatted_value(), "49,194");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_formatter_renders_an_error() {
    let session = Session::builder(
        Schema::from_toml(MINI).unwrap(),
        Arc::new(common::foodmart_db()),
    )
    .dialect(common::sqlite())
    .formatter("units", formatter_fn(|_| Err("formatter broke".to_string())))
    .build()
    .unwrap();
    let result = session
        .execute("SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]")
        .unwrap();
    let cell = result.cell(&[0]);
    assert_eq!(cell.formatted_value(), "#ERR: formatter broke");
    // The value itself is fine.
    assert_eq!(cell.value(), &CellValue::Number(common::CELLS.iter().flatten().sum::<i64>() as f64));
}

#[test]
fn test_unregistered_formatter_falls_back_to_plain_text() {
    let session = Session::builder(
        Schema::from_toml(MINI).unwrap(),
        Arc::new(common::foodmart_db()),
    )
    .dialect(common::sqlite())
    .build()
    .unwrap();
    let result = session
        .execute("SELECT {[Measures].[Unit Sales]} ON COLUMNS FROM [Sales]")
        .unwrap();
    assert_eq!(result.cell(&[0]).formatted_value(), "266773");
}
