//! # Ledger Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TIENDA_DB_PATH=/srv/tienda/tienda.db                               │
//! │     TIENDA_DB_MAX_CONNECTIONS=5                                        │
//! │     TIENDA_DB_TIMEOUT_SECS=30                                          │
//! │     TIENDA_REGISTER_WRITE_THROUGH=true                                 │
//! │     TIENDA_COMPUTE_OVERDUE=true                                        │
//! │     TIENDA_LOG=info,tienda=debug,sqlx=warn                             │
//! │                                                                         │
//! │  2. Default Values (lowest priority)                                   │
//! │     Database in the platform data directory:                          │
//! │       ~/.local/share/pos/tienda.db (Linux)                             │
//! │       ~/Library/Application Support/com.tienda.pos/tienda.db (macOS)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a typo in a log filter, a value that does not parse
//! (`TIENDA_DB_MAX_CONNECTIONS=lots`) is an error, not silently ignored.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;
use tracing::debug;

use tienda_core::credit::InterestPolicy;
use tienda_db::DbConfig;

/// Default tracing filter when neither `RUST_LOG` nor `TIENDA_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "info,tienda=debug,sqlx=warn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Could not determine a data directory; set TIENDA_DB_PATH")]
    NoDataDir,
}

/// Settings shared by every engine.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
    /// Wait for a free connection before a call fails.
    pub acquire_timeout: Duration,
    /// Non-credit sales add to the open register inside the sale transaction.
    pub register_write_through: bool,
    /// Unpaid credit sales past their due date are reported as overdue.
    pub compute_overdue: bool,
    pub log_filter: String,
}

impl LedgerConfig {
    /// Defaults with the given database path.
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        LedgerConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            register_write_through: true,
            compute_overdue: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Loads defaults, then applies `TIENDA_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`LedgerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = match lookup("TIENDA_DB_PATH") {
            Some(path) => {
                debug!(path = %path, "Overriding database path from environment");
                PathBuf::from(path)
            }
            None => default_database_path()?,
        };
        let mut config = LedgerConfig::with_database(database_path);

        if let Some(raw) = lookup("TIENDA_DB_MAX_CONNECTIONS") {
            config.max_connections = match raw.parse::<u32>() {
                Ok(n) if n > 0 => n,
                Ok(_) => return Err(invalid("TIENDA_DB_MAX_CONNECTIONS", raw, "must be at least 1")),
                Err(e) => return Err(invalid("TIENDA_DB_MAX_CONNECTIONS", raw, e.to_string())),
            };
        }
        if let Some(raw) = lookup("TIENDA_DB_TIMEOUT_SECS") {
            config.acquire_timeout = match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                Ok(_) => return Err(invalid("TIENDA_DB_TIMEOUT_SECS", raw, "must be at least 1")),
                Err(e) => return Err(invalid("TIENDA_DB_TIMEOUT_SECS", raw, e.to_string())),
            };
        }
        if let Some(raw) = lookup("TIENDA_REGISTER_WRITE_THROUGH") {
            config.register_write_through = parse_flag("TIENDA_REGISTER_WRITE_THROUGH", raw)?;
        }
        if let Some(raw) = lookup("TIENDA_COMPUTE_OVERDUE") {
            config.compute_overdue = parse_flag("TIENDA_COMPUTE_OVERDUE", raw)?;
        }
        if let Some(filter) = lookup("TIENDA_LOG") {
            config.log_filter = filter;
        }

        Ok(config)
    }

    /// Pool settings for this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path.clone())
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
    }

    pub fn interest_policy(&self) -> InterestPolicy {
        InterestPolicy {
            compute_overdue: self.compute_overdue,
        }
    }
}

/// `<data dir>/tienda.db`, creating the directory if needed.
fn default_database_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "tienda", "pos").ok_or(ConfigError::NoDataDir)?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::InvalidValue {
        var: "TIENDA_DB_PATH",
        value: data_dir.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(data_dir.join("tienda.db"))
}

fn parse_flag(var: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected true or false")),
    }
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_explicit_path() {
        let config = LedgerConfig::from_lookup(lookup(&[("TIENDA_DB_PATH", "/tmp/t.db")])).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.register_write_through);
        assert!(config.compute_overdue);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("TIENDA_DB_PATH", "/tmp/t.db"),
            ("TIENDA_DB_MAX_CONNECTIONS", "2"),
            ("TIENDA_DB_TIMEOUT_SECS", "4"),
            ("TIENDA_REGISTER_WRITE_THROUGH", "off"),
            ("TIENDA_COMPUTE_OVERDUE", "FALSE"),
            ("TIENDA_LOG", "warn"),
        ]))
        .unwrap();
        assert_eq!(config.max_connections, 2);
        assert!(!config.register_write_through);
        assert!(!config.interest_policy().compute_overdue);
        assert_eq!(config.log_filter, "warn");
        assert_eq!(config.db_config().max_connections, 2);
        assert_eq!(config.db_config().acquire_timeout, Duration::from_secs(4));
    }

    #[test]
    fn test_unparsable_values_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[
            ("TIENDA_DB_PATH", "/tmp/t.db"),
            ("TIENDA_DB_MAX_CONNECTIONS", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "TIENDA_DB_MAX_CONNECTIONS", .. }));

        let err = LedgerConfig::from_lookup(lookup(&[
            ("TIENDA_DB_PATH", "/tmp/t.db"),
            ("TIENDA_DB_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "TIENDA_DB_TIMEOUT_SECS", .. }));

        let err = LedgerConfig::from_lookup(lookup(&[
            ("TIENDA_DB_PATH", "/tmp/t.db"),
            ("TIENDA_COMPUTE_OVERDUE", "maybe"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "TIENDA_COMPUTE_OVERDUE", .. }));
    }
}
