//! Sessions: one schema over one connection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use super::eval::QueryState;
use super::format::CellFormatter;
use super::member::HierarchyMembers;
use super::reader::MemberReader;
use super::result::QueryResult;
use super::udf::UserDefinedFunction;
use super::{EvalError, OlapResult};
use crate::cache::AggregationManager;
use crate::config::Settings;
use crate::connection::SqlConnection;
use crate::drillthrough::{self, DrillThroughResult};
use crate::mdx::{parse_statement, Statement};
use crate::schema::{HierarchyId, Schema};
use crate::sql::{Dialect, SqlDialect};

/// State shared by every query of a session.
pub(crate) struct Shared {
    pub(crate) schema: Arc<Schema>,
    pub(crate) connection: Arc<dyn SqlConnection>,
    pub(crate) dialect: Dialect,
    pub(crate) settings: Settings,
    pub(crate) cache: Arc<AggregationManager>,
    pub(crate) reader: MemberReader,
    /// Keyed by lowercase name.
    pub(crate) udfs: HashMap<String, Arc<dyn UserDefinedFunction>>,
    pub(crate) formatters: HashMap<String, Arc<dyn CellFormatter>>,
}

/// An open schema. Cheap to clone; clones share the member trees and
/// the aggregation cache, and may be used from many threads.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("schema", &self.shared.schema.name)
            .field("dialect", &self.shared.dialect.product())
            .finish()
    }
}

pub struct SessionBuilder {
    schema: Arc<Schema>,
    connection: Arc<dyn SqlConnection>,
    dialect: Option<Dialect>,
    settings: Settings,
    cache: Option<Arc<AggregationManager>>,
    udfs: Vec<Arc<dyn UserDefinedFunction>>,
    formatters: HashMap<String, Arc<dyn CellFormatter>>,
}

impl SessionBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `dialect` instead of detecting one from the connection.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Share an aggregation cache with other sessions over the same data.
    pub fn cache(mut self, cache: Arc<AggregationManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn udf(mut self, udf: Arc<dyn UserDefinedFunction>) -> Self {
        self.udfs.push(udf);
        self
    }

    /// Register a cell formatter under the name measures refer to.
    pub fn formatter(mut self, name: &str, formatter: Arc<dyn CellFormatter>) -> Self {
        self.formatters.insert(name.to_string(), formatter);
        self
    }

    pub fn build(self) -> OlapResult<Session> {
        let dialect = match self.dialect {
            Some(dialect) => dialect,
            None => match self.settings.connection.product()? {
                Some(product) => Dialect::for_product(product),
                None => Dialect::detect(self.connection.as_ref())?,
            },
        };
        info!(
            schema = %self.schema.name,
            product = %dialect.product().name(),
            "session opened"
        );

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(AggregationManager::new(&self.settings.cache)));
        let reader = MemberReader::new(self.schema.clone(), self.connection.clone(), dialect);
        let udfs = self
            .udfs
            .into_iter()
            .map(|udf| (udf.name().to_ascii_lowercase(), udf))
            .collect();

        Ok(Session {
            shared: Arc::new(Shared {
                schema: self.schema,
                connection: self.connection,
                dialect,
                settings: self.settings,
                cache,
                reader,
                udfs,
                formatters: self.formatters,
            }),
        })
    }
}

impl Session {
    pub fn builder(
        schema: impl Into<Arc<Schema>>,
        connection: Arc<dyn SqlConnection>,
    ) -> SessionBuilder {
        SessionBuilder {
            schema: schema.into(),
            connection,
            dialect: None,
            settings: Settings::default(),
            cache: None,
            udfs: Vec::new(),
            formatters: HashMap::new(),
        }
    }

    /// Run an MDX `SELECT`. Every cell is evaluated before this returns.
    pub fn execute(&self, mdx: &str) -> OlapResult<QueryResult> {
        debug!(mdx, "execute");
        match parse_statement(mdx)? {
            Statement::Select(select) => {
                let state = QueryState::new(self.shared.clone(), &select.cube, &select.with)?;
                QueryResult::evaluate(Arc::new(state), &select)
            }
            Statement::DrillThrough(_) => Err(EvalError::Type(
                "DRILLTHROUGH statements run through execute_drill_through".into(),
            )
            .into()),
        }
    }

    /// Run an MDX `DRILLTHROUGH` statement.
    pub fn execute_drill_through(&self, mdx: &str) -> OlapResult<DrillThroughResult> {
        debug!(mdx, "execute drill-through");
        match parse_statement(mdx)? {
            Statement::DrillThrough(statement) => {
                drillthrough::execute(self.shared.clone(), &statement)
            }
            Statement::Select(_) => Err(EvalError::Type(
                "expected a DRILLTHROUGH statement".into(),
            )
            .into()),
        }
    }

    pub fn cache(&self) -> &Arc<AggregationManager> {
        &self.shared.cache
    }

    /// Members of `hierarchy`, read from the database on first use.
    pub fn members(&self, hierarchy: HierarchyId) -> OlapResult<Arc<HierarchyMembers>> {
        Ok(self.shared.reader.members(hierarchy)?)
    }

    pub fn dialect(&self) -> &Dialect {
        &self.shared.dialect
    }

    pub fn schema(&self) -> &Schema {
        &self.shared.schema
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn connection(&self) -> &Arc<dyn SqlConnection> {
        &self.shared.connection
    }
}
