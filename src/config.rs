use std::collections::HashMap;
use std::path::Path;

use config::{Config as ConfigLib, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

/// Database configuration naming a backend and how to reach it.
///
/// Loaded from a JSON, TOML or YAML file such as
/// `{"driver": "sqlite3", "data_source": "certs.db"}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Backend kind: `sqlite3`, `sqlite`, `redis` or `memory`.
    pub driver: String,
    /// Connection string, e.g. a SQLite path or a `redis://` URI.
    #[serde(default = "empty_secret")]
    pub data_source: SecretString,
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

impl DbConfig {
    pub fn new(driver: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            data_source: SecretString::from(data_source.into()),
        }
    }

    /// Loads the configuration file at `path`.
    ///
    /// Environment variables of the form `CERTDB_DB_DRIVER` or `CERTDB_DB_DATA_SOURCE`
    /// override the file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with_sources(path, None)
    }

    pub fn load_with_sources(
        path: impl AsRef<Path>,
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder().add_source(File::from(path.as_ref()).required(true));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            builder = builder.add_source(Environment::with_prefix("CERTDB_DB").prefix_separator("_"));
        }

        builder.build()?.try_deserialize()
    }
}
