//! SQLite connection backed by rusqlite.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use super::{
    ColumnMeta, ConnectionError, ConnectionResult, DatabaseMetadata, ResultSet, SqlConnection,
    SqlType, Value,
};

/// A SQLite database. Statements are serialized through a mutex.
pub struct SqliteConnection {
    conn: Mutex<Connection>,
}

impl SqliteConnection {
    /// Open a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> ConnectionResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| ConnectionError::Open(format!("{}: {e}", path.display())))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> ConnectionResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ConnectionError::Open(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run DDL/DML statements separated by semicolons.
    pub fn execute_batch(&self, sql: &str) -> ConnectionResult<()> {
        let conn = self.conn.lock().map_err(|_| ConnectionError::Poisoned)?;
        conn.execute_batch(sql).map_err(|e| sql_error(sql, e))
    }

    /// Run one statement with positional parameters.
    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> ConnectionResult<usize> {
        let conn = self.conn.lock().map_err(|_| ConnectionError::Poisoned)?;
        conn.execute(sql, params).map_err(|e| sql_error(sql, e))
    }
}

fn sql_error(sql: &str, err: rusqlite::Error) -> ConnectionError {
    ConnectionError::Sql {
        sql: sql.to_string(),
        message: err.to_string(),
    }
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// SQLite is dynamically typed; report the storage class of the first
/// non-null value in each column.
fn infer_type(rows: &[Vec<Value>], index: usize) -> SqlType {
    rows.iter()
        .filter_map(|row| row.get(index))
        .find(|v| !v.is_null())
        .map(|v| match v {
            Value::Int(_) => SqlType::Integer,
            Value::Float(_) => SqlType::Double,
            Value::Text(_) => SqlType::Varchar,
            Value::Null => SqlType::Other,
        })
        .unwrap_or(SqlType::Other)
}

impl SqlConnection for SqliteConnection {
    fn metadata(&self) -> ConnectionResult<DatabaseMetadata> {
        Ok(DatabaseMetadata::new("SQLite", rusqlite::version()))
    }

    fn execute_query(&self, sql: &str, max_rows: Option<usize>) -> ConnectionResult<ResultSet> {
        debug!(sql, "executing query");
        let conn = self.conn.lock().map_err(|_| ConnectionError::Poisoned)?;
        let mut stmt = conn.prepare(sql).map_err(|e| sql_error(sql, e))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = stmt.column_count();

        let mut rows_out = Vec::new();
        let mut rows = stmt.query([]).map_err(|e| sql_error(sql, e))?;
        while let Some(row) = rows.next().map_err(|e| sql_error(sql, e))? {
            if max_rows.is_some_and(|max| rows_out.len() >= max) {
                break;
            }
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(to_value(row.get_ref(i).map_err(|e| sql_error(sql, e))?));
            }
            rows_out.push(values);
        }

        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnMeta::new(name, infer_type(&rows_out, i)))
            .collect();
        Ok(ResultSet::new(columns, rows_out))
    }
}
