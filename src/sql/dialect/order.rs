//! ORDER BY items with forced NULL placement.

use super::capabilities::NullOrderStyle;
use super::SqlDialect;

/// Render one ORDER BY item so NULLs sort first or last whatever the
/// product's native collation.
///
/// Non-nullable expressions never get NULL handling. Products that cannot
/// force placement get the bare item.
pub fn generate_order_item<D: SqlDialect + ?Sized>(
    dialect: &D,
    expr: &str,
    nullable: bool,
    ascending: bool,
    nulls_last: bool,
) -> String {
    let dir = if ascending { "ASC" } else { "DESC" };
    if !nullable {
        return format!("{expr} {dir}");
    }
    match dialect.capabilities().null_order {
        NullOrderStyle::Ansi => {
            let nulls = if nulls_last { "LAST" } else { "FIRST" };
            format!("{expr} {dir} NULLS {nulls}")
        }
        // ISNULL() is 1 for NULL, so ascending on it pushes NULLs last
        NullOrderStyle::IsNullFunction => {
            let null_dir = if nulls_last { "ASC" } else { "DESC" };
            format!("ISNULL({expr}) {null_dir}, {expr} {dir}")
        }
        NullOrderStyle::CaseExpression => {
            let (null_rank, value_rank) = if nulls_last { (1, 0) } else { (0, 1) };
            format!(
                "CASE WHEN {expr} IS NULL THEN {null_rank} ELSE {value_rank} END, {expr} {dir}"
            )
        }
        NullOrderStyle::Unsupported => format!("{expr} {dir}"),
    }
}
