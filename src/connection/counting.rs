//! Decorator that counts statement executions.

use std::sync::Arc;

use dashmap::DashMap;

use super::{ConnectionResult, DatabaseMetadata, ResultSet, SqlConnection};

/// Wraps a connection and counts how often each exact statement runs.
pub struct CountingConnection {
    inner: Arc<dyn SqlConnection>,
    counts: DashMap<String, usize>,
}

impl CountingConnection {
    pub fn new(inner: Arc<dyn SqlConnection>) -> Self {
        Self {
            inner,
            counts: DashMap::new(),
        }
    }

    /// Executions of statements containing `fragment`.
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.counts
            .iter()
            .filter(|entry| entry.key().contains(fragment))
            .map(|entry| *entry.value())
            .sum()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Largest number of times any single statement ran.
    pub fn max_per_statement(&self) -> usize {
        self.counts
            .iter()
            .map(|entry| *entry.value())
            .max()
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts.clear();
    }
}

impl SqlConnection for CountingConnection {
    fn metadata(&self) -> ConnectionResult<DatabaseMetadata> {
        self.inner.metadata()
    }

    fn execute_query(&self, sql: &str, max_rows: Option<usize>) -> ConnectionResult<ResultSet> {
        *self.counts.entry(sql.to_string()).or_insert(0) += 1;
        self.inner.execute_query(sql, max_rows)
    }
}
