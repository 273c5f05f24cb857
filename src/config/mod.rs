//! Configuration module for the metrics engine.
//!
//! Handles the TOML settings file, environment variables, and defaults.

mod settings;

pub use settings::{
    expand_env_vars, parse_duration, BatchSettings, CalendarSettings, LogFormat, LoggingSettings,
    QuerySettings, Settings, SettingsError, StorageSettings, CONFIG_ENV_VAR,
};
