//! Cell values.

use std::fmt;

use serde::Serialize;

use crate::connection::Value;

/// The value of a cell or of a scalar MDX expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellValue {
    /// No fact rows, or a null member in the coordinate.
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    /// Failure of a user-defined function or formatter; shown as `#ERR: ...`.
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Empty | CellValue::Error(_) => None,
        }
    }

    /// MDX truthiness: non-zero numbers and `true` are true.
    pub fn is_true(&self) -> bool {
        match self {
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => !s.is_empty(),
            CellValue::Empty | CellValue::Error(_) => false,
        }
    }

    pub fn from_sql(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Int(i) => CellValue::Number(*i as f64),
            Value::Float(f) => CellValue::Number(*f),
            Value::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::Text(s.clone()),
            },
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Error(message) => write!(f, "#ERR: {message}"),
        }
    }
}
