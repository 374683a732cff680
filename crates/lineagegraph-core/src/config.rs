//! Configuration schema (lineagegraph.toml)

use serde::{Deserialize, Serialize};

/// SQL dialect forwarded to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectConfig {
    /// Snowflake SQL dialect
    #[default]
    Snowflake,

    /// BigQuery SQL dialect
    BigQuery,

    /// PostgreSQL SQL dialect
    Postgres,

    /// Generic ANSI SQL
    Ansi,
}

impl DialectConfig {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snowflake => "snowflake",
            Self::BigQuery => "bigquery",
            Self::Postgres => "postgres",
            Self::Ansi => "ansi",
        }
    }
}

impl std::fmt::Display for DialectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which earlier snapshot a run merges against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Also accept an incomplete snapshot if it is recent enough
    #[serde(default)]
    pub tolerate_incomplete: bool,

    /// Age limit for incomplete snapshots, in minutes
    #[serde(default = "default_minute_tolerance")]
    pub minute_tolerance: u32,
}

fn default_minute_tolerance() -> u32 {
    10
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            tolerate_incomplete: false,
            minute_tolerance: default_minute_tolerance(),
        }
    }
}

/// What to do when a dependency endpoint cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnUnresolved {
    /// Fail the run
    #[default]
    Abort,

    /// Drop the dependency and record a warning
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPolicy {
    #[serde(default)]
    pub on_unresolved_dependency: OnUnresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Source objects resolved at the same time
    #[serde(default = "default_resolve_workers")]
    pub resolve_workers: usize,
}

fn default_resolve_workers() -> usize {
    4
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            resolve_workers: default_resolve_workers(),
        }
    }
}

impl ConcurrencyConfig {
    /// Worker count, never below one
    pub fn workers(&self) -> usize {
        self.resolve_workers.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Query history entries fetched per run
    #[serde(default = "default_query_history_limit")]
    pub query_history_limit: usize,
}

fn default_query_history_limit() -> usize {
    10
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            query_history_limit: default_query_history_limit(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Latest snapshot lookup
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Dependency resolution failure policy
    #[serde(default)]
    pub resolution: ResolutionPolicy,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub dashboards: DashboardConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
