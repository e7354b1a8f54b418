//! Database connections.
//!
//! The engine talks to a database through the narrow [`SqlConnection`]
//! trait: read driver metadata once for dialect detection, then run
//! SELECT statements and get materialized rows back.
//!
//! Implementations:
//! - [`SqliteConnection`]: a real embedded database (tests, CLI)
//! - [`ScriptedConnection`]: canned metadata and results keyed by SQL text
//! - [`CountingConnection`]: decorator counting executions per statement

mod counting;
mod scripted;
mod sqlite;

pub use counting::CountingConnection;
pub use scripted::ScriptedConnection;
pub use sqlite::SqliteConnection;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Errors raised by a connection. SQL failures always carry the statement.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("SQL error while executing \"{sql}\": {message}")]
    Sql { sql: String, message: String },

    #[error("Failed to read database metadata: {0}")]
    Metadata(String),

    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("No scripted result for \"{0}\"")]
    NoScriptedResult(String),

    #[error("Connection lock poisoned")]
    Poisoned,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// What the driver reports about the database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    pub product_name: String,
    pub product_version: String,
    pub stores_upper_case_identifiers: bool,
    pub stores_lower_case_identifiers: bool,
    pub max_column_name_length: Option<usize>,
}

impl DatabaseMetadata {
    pub fn new(product_name: &str, product_version: &str) -> Self {
        Self {
            product_name: product_name.into(),
            product_version: product_version.into(),
            ..Default::default()
        }
    }
}

/// Column type codes, following the JDBC `java.sql.Types` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Boolean,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    Date,
    Timestamp,
    Other,
}

/// Result-set column description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub sql_type: SqlType,
    pub precision: i32,
    pub scale: i32,
}

impl ColumnMeta {
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
            precision: 0,
            scale: 0,
        }
    }

    pub fn with_precision(mut self, precision: i32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }
}

/// A single database value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Sort order used for member keys: NULL last, numbers numerically,
    /// text lexically, numbers before text.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
            (a, b) => {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.total_cmp(&b)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64).to_bits() == b.to_bits()
            }
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            // Ints and integral floats compare equal, so they must hash alike
            Value::Int(i) => (*i as f64).to_bits().hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "#null"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e15 => write!(f, "{}", *x as i64),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

/// Materialized rows of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Single-value result, as returned by probes and COUNT queries.
    pub fn scalar(name: &str, value: Value) -> Self {
        let sql_type = match value {
            Value::Int(_) => SqlType::Integer,
            Value::Float(_) => SqlType::Double,
            _ => SqlType::Varchar,
        };
        Self {
            columns: vec![ColumnMeta::new(name, sql_type)],
            rows: vec![vec![value]],
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A JDBC-like database connection.
pub trait SqlConnection: Send + Sync {
    fn metadata(&self) -> ConnectionResult<DatabaseMetadata>;

    /// Run a query and return at most `max_rows` rows.
    fn execute_query(&self, sql: &str, max_rows: Option<usize>) -> ConnectionResult<ResultSet>;
}
