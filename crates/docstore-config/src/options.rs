//! Parses and validates the engine's connection-string options (§6.4).

use std::collections::HashMap;

use figment::value::{Dict, Map, Value};
use figment::{Figment, Metadata, Profile, Provider};
use serde::Deserialize;
use thiserror::Error;

/// A specialized `Result` type for engine configuration.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while parsing or validating a connection string.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The connection string had no `Data Source` key, or it was empty.
    #[error("connection string is missing the required 'Data Source' key")]
    MissingDataSource,

    /// A recognized key held a value outside its accepted set.
    #[error("invalid value for connection string key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    /// The env/connection-string layers could not be merged.
    #[error("failed to read engine configuration: {0}")]
    Figment(#[from] figment::Error),
}

/// `Mode` (§6.4): whether the store opens an in-memory SQLite database or
/// one backed by the `Data Source` file path. Defaults to file-backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    #[default]
    File,
    Memory,
}

/// `Cache` (§6.4): SQLite's shared-cache mode. Defaults to private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Private,
    Shared,
}

/// Parsed and validated engine configuration.
///
/// `extra` carries every connection-string key other than `Data Source`,
/// `Mode`, and `Cache` verbatim, for pass-through to the underlying SQL
/// engine (§6.4: "any other key accepted by the underlying SQL engine is
/// passed through").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub data_source: String,
    pub mode: EngineMode,
    pub cache: CacheMode,
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawOptions {
    data_source: Option<String>,
    mode: Option<String>,
    cache: Option<String>,
}

/// Splits a `key=value;key=value` connection string into a flat map, keyed
/// by `lower_snake_case` so the keys line up with the `DOCSTORE_*`
/// environment variables layered on top of them.
fn parse_pairs(src: &str) -> HashMap<String, String> {
    src.split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (key, value) = pair.split_once('=')?;
            Some((normalize_key(key.trim()), value.trim().to_string()))
        })
        .collect()
}

fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace(' ', "_")
}

/// A `figment::Provider` over an already-parsed connection string.
struct ConnectionString(HashMap<String, String>);

impl Provider for ConnectionString {
    fn metadata(&self) -> Metadata {
        Metadata::named("connection string")
    }

    fn data(&self) -> figment::Result<Map<Profile, Dict>> {
        let dict: Dict = self.0.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))).collect();
        Ok(Map::from([(Profile::Default, dict)]))
    }
}

impl EngineOptions {
    /// Parses a `key=value;key=value` connection string, layering
    /// `DOCSTORE_DATA_SOURCE` / `DOCSTORE_MODE` / `DOCSTORE_CACHE`
    /// environment variables over it for operators who prefer env-based
    /// deployment. Fails validation before any store is opened if
    /// `Data Source` is absent or a recognized key holds an unknown value.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let pairs = parse_pairs(connection_string);
        let figment =
            Figment::new().merge(ConnectionString(pairs)).merge(figment::providers::Env::prefixed("DOCSTORE_"));

        let raw: RawOptions = figment.extract()?;

        let data_source = raw.data_source.filter(|s| !s.is_empty()).ok_or(ConfigError::MissingDataSource)?;

        let mode = match raw.mode.as_deref() {
            None => EngineMode::File,
            Some(s) if s.eq_ignore_ascii_case("memory") => EngineMode::Memory,
            Some(s) if s.eq_ignore_ascii_case("file") => EngineMode::File,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "Mode".to_string(),
                    reason: format!("expected 'Memory' or 'file', got '{other}'"),
                })
            }
        };

        let cache = match raw.cache.as_deref() {
            None => CacheMode::Private,
            Some(s) if s.eq_ignore_ascii_case("shared") => CacheMode::Shared,
            Some(s) if s.eq_ignore_ascii_case("private") => CacheMode::Private,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "Cache".to_string(),
                    reason: format!("expected 'Shared' or 'private', got '{other}'"),
                })
            }
        };

        let mut extra: HashMap<String, String> = figment.extract().unwrap_or_default();
        for known in ["data_source", "mode", "cache"] {
            extra.remove(known);
        }

        Ok(Self { data_source, mode, cache, extra })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_source_only() {
        let opts = EngineOptions::parse("Data Source=/tmp/table.db").unwrap();
        assert_eq!(opts.data_source, "/tmp/table.db");
        assert_eq!(opts.mode, EngineMode::File);
        assert_eq!(opts.cache, CacheMode::Private);
        assert!(opts.extra.is_empty());
    }

    #[test]
    fn recognizes_memory_mode_case_insensitively() {
        let opts = EngineOptions::parse("Data Source=test;Mode=Memory").unwrap();
        assert_eq!(opts.mode, EngineMode::Memory);
    }

    #[test]
    fn recognizes_shared_cache() {
        let opts = EngineOptions::parse("Data Source=test;Cache=Shared").unwrap();
        assert_eq!(opts.cache, CacheMode::Shared);
    }

    #[test]
    fn rejects_missing_data_source() {
        assert!(matches!(EngineOptions::parse("Mode=Memory"), Err(ConfigError::MissingDataSource)));
    }

    #[test]
    fn rejects_unknown_mode_value() {
        assert!(matches!(
            EngineOptions::parse("Data Source=test;Mode=bogus"),
            Err(ConfigError::InvalidValue { key, .. }) if key == "Mode"
        ));
    }

    #[test]
    fn keeps_unrecognized_keys_as_passthrough() {
        let opts = EngineOptions::parse("Data Source=test;Foreign Keys=true;Busy Timeout=5000").unwrap();
        assert_eq!(opts.extra.get("foreign_keys").map(String::as_str), Some("true"));
        assert_eq!(opts.extra.get("busy_timeout").map(String::as_str), Some("5000"));
    }

    #[test]
    fn trims_whitespace_around_keys_and_values() {
        let opts = EngineOptions::parse(" Data Source = test ; Mode = Memory ").unwrap();
        assert_eq!(opts.data_source, "test");
        assert_eq!(opts.mode, EngineMode::Memory);
    }
}
