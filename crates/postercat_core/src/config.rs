//! Catalog runtime configuration.
//!
//! # Responsibility
//! - Describe where the catalog database lives, how logging is set up and
//!   which gap policy the membership engine applies.
//! - Load that description from JSON.
//!
//! # Invariants
//! - Every field has a default, so `{}` is a valid configuration.
//! - A missing `database_path` means a private in-memory database.

use crate::db::{open_db_with, DbLocation, DbResult};
use crate::logging::default_log_level;
use crate::service::membership_service::GapPolicy;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors from configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file cannot be read.
    Io { path: PathBuf, source: std::io::Error },
    /// Config text is not valid JSON for [`CatalogConfig`].
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid catalog config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

/// Catalog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    /// SQLite file; `None` opens an in-memory database.
    pub database_path: Option<PathBuf>,
    /// `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` leaves logging off.
    pub log_dir: Option<PathBuf>,
    pub gap_policy: GapPolicy,
    /// How long a writer waits for a competing transaction.
    pub busy_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            gap_policy: GapPolicy::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl CatalogConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(ConfigError::Parse)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn db_location(&self) -> DbLocation {
        match &self.database_path {
            Some(path) => DbLocation::File(path.clone()),
            None => DbLocation::Memory,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Opens the catalog database described by `config`.
pub fn open_catalog_db(config: &CatalogConfig) -> DbResult<Connection> {
    open_db_with(&config.db_location(), config.busy_timeout())
}

#[cfg(test)]
mod tests {
    use super::{CatalogConfig, ConfigError};
    use crate::db::DbLocation;
    use crate::service::membership_service::GapPolicy;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_object_uses_defaults() {
        let config = CatalogConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CatalogConfig::default());
        assert_eq!(config.db_location(), DbLocation::Memory);
        assert_eq!(config.gap_policy, GapPolicy::Close);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn parses_explicit_fields() {
        let config = CatalogConfig::from_json_str(
            r#"{
                "database_path": "/var/lib/postercat/catalog.sqlite3",
                "log_level": "warn",
                "gap_policy": "leave",
                "busy_timeout_ms": 250
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.db_location(),
            DbLocation::File(PathBuf::from("/var/lib/postercat/catalog.sqlite3"))
        );
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.gap_policy, GapPolicy::Leave);
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_unknown_gap_policy_and_fields() {
        let err = CatalogConfig::from_json_str(r#"{"gap_policy": "shrink"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = CatalogConfig::from_json_str(r#"{"db": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid catalog config"));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = CatalogConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
