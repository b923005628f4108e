//! Configuration loaded from environment variables.

use std::path::PathBuf;

use crate::assess::Settings;

/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3001`)
/// - `CUT_DB`: SQLite database path (default `"cutting.db"`)
/// - `CUT_PROJECTION_LIMIT`: sheets per format when projecting shortages (default `10000`)
/// - `CUT_LOG_FILE`: append logs to this file instead of stderr
/// - `SENTRY_DSN`: report errors to Sentry when set
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub projection_limit: u32,
    pub log_file: Option<PathBuf>,
    pub sentry_dsn: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database: var("CUT_DB").map(PathBuf::from).unwrap_or(defaults.database),
            projection_limit: var("CUT_PROJECTION_LIMIT")
                .and_then(|l| l.parse().ok())
                .filter(|l| *l > 0)
                .unwrap_or(defaults.projection_limit),
            log_file: non_empty("CUT_LOG_FILE").map(PathBuf::from),
            sentry_dsn: non_empty("SENTRY_DSN"),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            projection_limit: self.projection_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database: PathBuf::from("cutting.db"),
            projection_limit: Settings::default().projection_limit,
            log_file: None,
            sentry_dsn: None,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3001");
        assert_eq!(config.database, PathBuf::from("cutting.db"));
        assert_eq!(config.settings(), Settings::default());
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_reads_variables() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("CUT_DB", "/var/lib/cut/shop.db"),
            ("CUT_PROJECTION_LIMIT", "250"),
            ("CUT_LOG_FILE", "development.log"),
            ("RUST_LOG", "debug"),
        ]);
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.database, PathBuf::from("/var/lib/cut/shop.db"));
        assert_eq!(config.settings().projection_limit, 250);
        assert_eq!(config.log_file, Some(PathBuf::from("development.log")));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config_from(&[("PORT", "eighty"), ("CUT_PROJECTION_LIMIT", "0")]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.projection_limit, 10_000);
    }

    #[test]
    fn test_blank_dsn_is_unset() {
        let config = config_from(&[("SENTRY_DSN", "  ")]);
        assert!(config.sentry_dsn.is_none());
    }
}
