//! Mapping of result-set column metadata to engine value types.

use serde::Serialize;

use super::{DatabaseProduct, SqlDialect};
use crate::connection::{ColumnMeta, SqlType};

/// How a result column is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Int,
    Double,
    Object,
}

/// Segment queries alias measures `m0`, `m1`, ...
fn is_measure_alias(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('m' | 'M'))
        && name.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

/// Decide the value type of column `index` of `columns`.
///
/// Most products report exact NUMERIC precision and scale. Oracle,
/// Netezza and MonetDB report `NUMERIC(0, 0)` for expressions whose type
/// they did not track, so the column name decides: measure aliases hold
/// aggregated decimals, anything else is a key.
pub fn get_type<D: SqlDialect + ?Sized>(
    dialect: &D,
    columns: &[ColumnMeta],
    index: usize,
) -> ColumnType {
    let Some(column) = columns.get(index) else {
        return ColumnType::Object;
    };
    let (precision, scale) = (column.precision, column.scale);

    match column.sql_type {
        SqlType::SmallInt | SqlType::Integer | SqlType::TinyInt | SqlType::Boolean => {
            ColumnType::Int
        }
        SqlType::Double | SqlType::Float | SqlType::Real | SqlType::BigInt => ColumnType::Double,
        SqlType::Numeric | SqlType::Decimal => match dialect.product() {
            DatabaseProduct::Oracle if precision == 0 && scale == -127 => ColumnType::Double,
            DatabaseProduct::Oracle if precision == 0 && scale == 0 => {
                if is_measure_alias(&column.name) {
                    ColumnType::Double
                } else {
                    ColumnType::Int
                }
            }
            DatabaseProduct::Netezza | DatabaseProduct::MonetDb if precision == 0 => {
                if is_measure_alias(&column.name) {
                    ColumnType::Object
                } else {
                    ColumnType::Int
                }
            }
            _ if scale == 0 && precision <= 9 => ColumnType::Int,
            _ => ColumnType::Double,
        },
        _ => ColumnType::Object,
    }
}
