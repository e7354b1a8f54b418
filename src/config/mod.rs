//! Settings read from `cubist.toml`.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, ConnectionSettings, DrillThroughSettings, QuerySettings,
    Settings, SettingsError,
};
