//! A connection that answers from a script instead of a database.

use std::sync::Mutex;

use super::{ConnectionError, ConnectionResult, DatabaseMetadata, ResultSet, SqlConnection};

#[derive(Debug, Clone)]
enum Outcome {
    Rows(ResultSet),
    Fail(String),
}

/// Canned metadata plus results selected by SQL substring.
///
/// Rules are tried in insertion order; the first whose fragment occurs in
/// the statement wins. Every executed statement is recorded.
#[derive(Debug)]
pub struct ScriptedConnection {
    metadata: DatabaseMetadata,
    rules: Vec<(String, Outcome)>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    pub fn new(metadata: DatabaseMetadata) -> Self {
        Self {
            metadata,
            rules: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(mut self, fragment: &str, result: ResultSet) -> Self {
        self.rules.push((fragment.into(), Outcome::Rows(result)));
        self
    }

    pub fn with_error(mut self, fragment: &str, message: &str) -> Self {
        self.rules.push((fragment.into(), Outcome::Fail(message.into())));
        self
    }

    /// Statements executed so far, oldest first.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl SqlConnection for ScriptedConnection {
    fn metadata(&self) -> ConnectionResult<DatabaseMetadata> {
        Ok(self.metadata.clone())
    }

    fn execute_query(&self, sql: &str, max_rows: Option<usize>) -> ConnectionResult<ResultSet> {
        self.executed
            .lock()
            .map_err(|_| ConnectionError::Poisoned)?
            .push(sql.to_string());

        let outcome = self
            .rules
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, outcome)| outcome)
            .ok_or_else(|| ConnectionError::NoScriptedResult(sql.to_string()))?;

        match outcome {
            Outcome::Rows(rs) => {
                let mut rs = rs.clone();
                if let Some(max) = max_rows {
                    rs.rows.truncate(max);
                }
                Ok(rs)
            }
            Outcome::Fail(message) => Err(ConnectionError::Sql {
                sql: sql.to_string(),
                message: message.clone(),
            }),
        }
    }
}
