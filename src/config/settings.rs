//! `cubist.toml`: drill-through limits, cache bounds, evaluation switches
//! and the CLI's connection. Paths may reference environment variables.
//!
//! ```toml
//! [drillthrough]
//! enabled = true
//! max_rows = 1000
//!
//! [cache]
//! counters_enabled = true
//! max_segments = 10000
//!
//! [query]
//! ignore_invalid_members = false
//! max_eval_depth = 256
//!
//! [connection]
//! database = "${FOODMART_DB}"
//! dialect = "postgresql"   # skip detection
//! schema = "./foodmart.toml"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sql::dialect::DatabaseProduct;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no config file at {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("invalid setting: {0}")]
    InvalidConfig(String),
}

/// Everything `cubist.toml` can set; every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub drillthrough: DrillThroughSettings,
    pub cache: CacheSettings,
    pub query: QuerySettings,
    pub connection: ConnectionSettings,
}

/// Drill-through configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrillThroughSettings {
    /// When false no cell is drillable and drill-through requests fail.
    pub enabled: bool,

    /// Row limit of a `DRILLTHROUGH` statement without `MAXROWS`.
    pub max_rows: usize,
}

impl Default for DrillThroughSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rows: 1000,
        }
    }
}

/// Aggregation cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maintain request/miss counters.
    pub counters_enabled: bool,

    /// Evict least recently used segments beyond this many.
    /// Unset or 0 means unbounded.
    pub max_segments: Option<usize>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            counters_enabled: true,
            max_segments: None,
        }
    }
}

impl CacheSettings {
    pub fn segment_limit(&self) -> Option<usize> {
        self.max_segments.filter(|n| *n > 0)
    }
}

/// Query evaluation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Treat members that cannot be resolved as empty instead of failing.
    pub ignore_invalid_members: bool,

    /// Deepest nesting of calculated member evaluation.
    pub max_eval_depth: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            ignore_invalid_members: false,
            max_eval_depth: 256,
        }
    }
}

/// Where the CLI finds its schema and database.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// SQLite database path (supports ${ENV_VAR} expansion).
    pub database: Option<String>,

    /// Dialect override; detection is skipped when set.
    pub dialect: Option<String>,

    /// Schema file path (supports ${ENV_VAR} expansion).
    pub schema: Option<String>,
}

impl ConnectionSettings {
    /// The configured dialect override, if any.
    pub fn product(&self) -> Result<Option<DatabaseProduct>, SettingsError> {
        self.dialect
            .as_deref()
            .map(|name| {
                name.parse::<DatabaseProduct>()
                    .map_err(|_| SettingsError::UnsupportedDialect(name.to_string()))
            })
            .transpose()
    }

    /// Get the database path with environment variables expanded.
    pub fn resolved_database(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.database
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }

    pub fn resolved_schema(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.schema
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SettingsError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// `$CUBIST_CONFIG` when set, else the first of `./cubist.toml` and
    /// `<config dir>/cubist/config.toml` that exists, else the defaults.
    pub fn load() -> Result<Self, SettingsError> {
        if let Some(path) = env::var_os("CUBIST_CONFIG") {
            return Self::from_file(path);
        }
        let candidates = std::iter::once(PathBuf::from("cubist.toml"))
            .chain(dirs::config_dir().map(|dir| dir.join("cubist").join("config.toml")));
        for path in candidates {
            if path.is_file() {
                debug!(path = %path.display(), "loading settings");
                return Self::from_file(path);
            }
        }
        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.query.max_eval_depth == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_eval_depth must be at least 1".into(),
            ));
        }
        self.connection.product()?;
        Ok(())
    }
}

/// Substitute `${NAME}` and `$NAME` with the variable's value.
///
/// A `$` not followed by a name is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s.chars().peekable();

    while let Some(c) = rest.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name: String = if rest.next_if_eq(&'{').is_some() {
            let name = std::iter::from_fn(|| rest.next_if(|ch| *ch != '}')).collect();
            rest.next();
            name
        } else {
            std::iter::from_fn(|| rest.next_if(|ch| ch.is_alphanumeric() || *ch == '_')).collect()
        };
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&env::var(&name).map_err(|_| SettingsError::MissingEnvVar(name))?);
        }
    }
    Ok(out)
}
