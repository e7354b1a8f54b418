//! Literal row sets rendered as a table-less SELECT.

use serde::Serialize;

use super::capabilities::InlineStyle;
use super::SqlDialect;

/// Type of an inline column; decides how values are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InlineType {
    String,
    Date,
    Numeric,
}

fn literal<D: SqlDialect + ?Sized>(dialect: &D, ty: InlineType, value: Option<&str>) -> String {
    let Some(value) = value else {
        return "NULL".to_string();
    };
    match ty {
        InlineType::String => dialect.quote_string_literal(value),
        InlineType::Date => {
            if dialect.capabilities().date_literals {
                format!("DATE {}", dialect.quote_string_literal(value))
            } else {
                dialect.quote_string_literal(value)
            }
        }
        // Anything that does not read as a number is quoted rather than
        // spliced into the statement. NaN and infinities have no SQL spelling.
        InlineType::Numeric => match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => value.trim().to_string(),
            Ok(_) => "NULL".to_string(),
            Err(_) => dialect.quote_string_literal(value),
        },
    }
}

/// Materialize `rows` as a SELECT with one column per name.
///
/// `types` and every row must have the same length as `names`; missing
/// trailing values are rendered as NULL. An empty row set yields a
/// statement with the right columns and no rows.
pub fn generate_inline<D: SqlDialect + ?Sized>(
    dialect: &D,
    names: &[&str],
    types: &[InlineType],
    rows: &[Vec<Option<String>>],
) -> String {
    let null_row: Vec<Option<String>> = vec![None; names.len()];
    let (rows, empty) = if rows.is_empty() {
        (std::slice::from_ref(&null_row), true)
    } else {
        (rows, false)
    };

    let render_row = |row: &Vec<Option<String>>| -> Vec<String> {
        names
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let ty = types.get(i).copied().unwrap_or(InlineType::String);
                literal(dialect, ty, row.get(i).and_then(|v| v.as_deref()))
            })
            .collect()
    };

    match dialect.capabilities().inline {
        InlineStyle::Values => {
            let values: Vec<String> = rows
                .iter()
                .map(|row| format!("({})", render_row(row).join(", ")))
                .collect();
            let columns: Vec<String> = names.iter().map(|n| dialect.quote_identifier(n)).collect();
            let alias_kw = if dialect.allows_as_for_table_alias() { "AS " } else { "" };
            let mut sql = format!(
                "SELECT * FROM (VALUES {}) {alias_kw}{} ({})",
                values.join(", "),
                dialect.quote_identifier("t"),
                columns.join(", ")
            );
            if empty {
                sql.push_str(" WHERE 1 = 0");
            }
            sql
        }
        InlineStyle::UnionAll | InlineStyle::UnionAllFrom(_) => {
            let from = match dialect.capabilities().inline {
                InlineStyle::UnionAllFrom(table) => Some(table),
                _ => None,
            };
            let selects: Vec<String> = rows
                .iter()
                .map(|row| {
                    let items: Vec<String> = render_row(row)
                        .into_iter()
                        .zip(names)
                        .map(|(value, name)| format!("{value} AS {}", dialect.quote_identifier(name)))
                        .collect();
                    let mut select = format!("SELECT {}", items.join(", "));
                    if let Some(table) = from {
                        select.push_str(" FROM ");
                        select.push_str(table);
                    }
                    select
                })
                .collect();
            let mut sql = selects.join(" UNION ALL ");
            if empty {
                let has_where = from.is_some_and(|t| t.to_lowercase().contains(" where "));
                sql.push_str(if has_where { " AND 1 = 0" } else { " WHERE 1 = 0" });
            }
            sql
        }
    }
}
