//! Engine configuration
//!
//! A plain value built once at startup and passed by reference to
//! [`open_store`](crate::store::open_store) and to step constructors.
//!
//! Sources, lowest precedence first: [`Config::default`], a TOML file
//! ([`Config::load`]), then environment variables ([`Config::apply_env`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Which [`StateStore`](crate::store::StateStore) backend to open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Sqlite,
    File,
    Memory,
}

impl StateBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateBackend::Sqlite => "sqlite",
            StateBackend::File => "file",
            StateBackend::Memory => "memory",
        }
    }
}

impl fmt::Display for StateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StateBackend::Sqlite),
            "file" | "json" => Ok(StateBackend::File),
            "memory" => Ok(StateBackend::Memory),
            _ => Err(ConfigError::InvalidValue {
                key: "STATE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Errors from loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_backend: StateBackend,
    pub state_db_path: PathBuf,
    pub data_dir: PathBuf,
    pub log_level: String,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_backend: StateBackend::default(),
            state_db_path: PathBuf::from("./data/state.db"),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            debug: false,
        }
    }
}

impl Config {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// ```
    /// use kubeloom::{Config, StateBackend};
    ///
    /// let config = Config::from_lookup(|key| match key {
    ///     "STATE_BACKEND" => Some("file".to_string()),
    ///     "DATA_DIR" => Some("/var/lib/kubeloom".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.state_backend, StateBackend::File);
    /// assert_eq!(
    ///     config.state_file_path(),
    ///     std::path::Path::new("/var/lib/kubeloom/state.json")
    /// );
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().apply_lookup(lookup)
    }

    /// Read a TOML file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `STATE_BACKEND`, `STATE_DB_PATH`, `DATA_DIR`, `LOG_LEVEL` and
    /// `DEBUG` from the process environment on top of `self`.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_lookup(|key| std::env::var(key).ok())
    }

    fn apply_lookup<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("STATE_BACKEND") {
            self.state_backend = value.parse()?;
        }
        if let Some(value) = lookup("STATE_DB_PATH") {
            self.state_db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = lookup("DEBUG") {
            self.debug = parse_bool("DEBUG", &value)?;
        }
        Ok(self)
    }

    /// Document used by the file backend.
    pub fn state_file_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Effective log filter directive.
    pub fn log_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.state_backend, StateBackend::Sqlite);
        assert_eq!(config.state_db_path, PathBuf::from("./data/state.db"));
        assert_eq!(config.state_file_path(), PathBuf::from("./data/state.json"));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("STATE_BACKEND", "Memory"),
            ("STATE_DB_PATH", "/tmp/kubeloom.db"),
            ("LOG_LEVEL", "warn"),
            ("DEBUG", "true"),
        ]))
        .unwrap();

        assert_eq!(config.state_backend, StateBackend::Memory);
        assert_eq!(config.state_db_path, PathBuf::from("/tmp/kubeloom.db"));
        assert_eq!(config.log_level, "warn");
        assert!(config.debug);
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = Config::from_lookup(lookup_from(&[("STATE_BACKEND", "postgres")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "STATE_BACKEND"
        ));

        let result = Config::from_lookup(lookup_from(&[("DEBUG", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_toml_partial() {
        let config = Config::from_toml_str(
            r#"
            state_backend = "file"
            data_dir = "/srv/kubeloom"
            "#,
        )
        .unwrap();
        assert_eq!(config.state_backend, StateBackend::File);
        assert_eq!(config.state_file_path(), PathBuf::from("/srv/kubeloom/state.json"));
        assert_eq!(config.log_level, "info");

        assert!(Config::from_toml_str("state_backend = \"etcd\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/kubeloom.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeloom.toml");
        std::fs::write(&path, "log_level = \"trace\"\nstate_backend = \"memory\"\n").unwrap();

        let config = Config::load(&path)
            .unwrap()
            .apply_lookup(lookup_from(&[("STATE_BACKEND", "sqlite")]))
            .unwrap();
        assert_eq!(config.state_backend, StateBackend::Sqlite);
        assert_eq!(config.log_level, "trace");
    }
}
