//! TOML-based configuration for the metrics engine.
//!
//! Supports a config file (mantis-metrics.toml) with environment variable
//! expansion in the storage path.
//!
//! Example configuration:
//! ```toml
//! [query]
//! default_limit = 10000
//! max_buckets = 5000
//! execution_timeout = "3m"
//! comparison_headroom = 2
//!
//! [calendar]
//! first_day_of_week = 1    # Monday
//! first_month_of_year = 1  # January
//!
//! [batch]
//! max_concurrency = 16
//!
//! [storage]
//! dialect = "sqlite"
//! path = "${DATA_DIR}/metrics.db"
//!
//! [logging]
//! filter = "mantis_metrics=info"
//! format = "pretty"
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::sql::Dialect;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MANTIS_METRICS_CONFIG";

static DURATION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(ms|s|m|h)\s*$").unwrap());

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub query: QuerySettings,
    pub calendar: CalendarSettings,
    pub batch: BatchSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Limits applied while compiling and executing queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Row cap for aggregations. Missing limits default to it, larger ones are clamped.
    pub default_limit: u64,

    /// Maximum number of buckets a time series may produce.
    pub max_buckets: usize,

    /// Per-statement execution timeout (e.g., "30s", "3m").
    pub execution_timeout: String,

    /// Multiplier on `offset + limit` for the first comparison pass.
    pub comparison_headroom: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_limit: 10_000,
            max_buckets: crate::timegrain::DEFAULT_MAX_BUCKETS,
            execution_timeout: "3m".to_string(),
            comparison_headroom: 2,
        }
    }
}

impl QuerySettings {
    pub fn execution_timeout(&self) -> Result<Duration, SettingsError> {
        parse_duration(&self.execution_timeout)
    }
}

/// Week and year alignment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// 1 = Monday … 7 = Sunday.
    pub first_day_of_week: u32,

    /// 1 = January … 12 = December.
    pub first_month_of_year: u32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            first_day_of_week: 1,
            first_month_of_year: 1,
        }
    }
}

/// Batch dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Maximum number of batch items executing at once.
    pub max_concurrency: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self { max_concurrency: 16 }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    pub dialect: Dialect,

    /// Database path for the bundled SQLite engine (supports ${ENV_VAR} expansion).
    /// In-memory when unset.
    pub path: Option<String>,
}

impl StorageSettings {
    /// Get the database path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "mantis_metrics=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `MANTIS_METRICS_CONFIG`
    /// 2. `./mantis-metrics.toml`
    /// 3. `~/.config/mantis-metrics/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("mantis-metrics.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("mantis-metrics").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.query.default_limit == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.default_limit must be greater than zero".into(),
            ));
        }
        if self.query.max_buckets == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.max_buckets must be greater than zero".into(),
            ));
        }
        if self.query.comparison_headroom == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.comparison_headroom must be greater than zero".into(),
            ));
        }
        if self.batch.max_concurrency == 0 {
            return Err(SettingsError::InvalidConfig(
                "batch.max_concurrency must be greater than zero".into(),
            ));
        }
        self.query.execution_timeout()?;
        Ok(())
    }
}

/// Parse a duration such as `250ms`, `30s`, `3m` or `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, SettingsError> {
    let caps = DURATION_PATTERN
        .captures(s)
        .ok_or_else(|| SettingsError::InvalidDuration(s.to_string()))?;
    let amount: u64 = caps[1]
        .parse()
        .map_err(|_| SettingsError::InvalidDuration(s.to_string()))?;
    Ok(match &caps[2] {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount * 60),
        _ => Duration::from_secs(amount * 3600),
    })
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            // $VAR ends at the first non-alphanumeric/underscore
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                var_name.push(ch);
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
