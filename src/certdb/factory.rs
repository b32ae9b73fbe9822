use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::certdb::{
    KvAccessor, MemoryHashStore, RedisHashStore, Result, SharedAccessor, SqlAccessor, StoreError,
};
use crate::config::DbConfig;

/// Backend selected by the `driver` entry of a database configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Relational store over SQLite (`sqlite3` or `sqlite`).
    Sqlite,
    /// Key-value store over Redis.
    Redis,
    /// Key-value store held in process memory.
    Memory,
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "sqlite3" | "sqlite" => Ok(BackendKind::Sqlite),
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            "" => Err(StoreError::Configuration(
                "no database driver specified".to_string(),
            )),
            other => Err(StoreError::Configuration(format!(
                "unsupported database driver {other:?}"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Sqlite => "sqlite3",
            BackendKind::Redis => "redis",
            BackendKind::Memory => "memory",
        })
    }
}

/// Builds the accessor named by `config` and checks that its backend answers.
///
/// Connectivity failures surface as [`StoreError::StoreUnavailable`], an unknown or
/// empty driver as [`StoreError::Configuration`].
pub async fn new_accessor(config: &DbConfig) -> Result<SharedAccessor> {
    let kind: BackendKind = config.driver.parse()?;
    debug!(driver = %kind, "creating accessor");

    let data_source = config.data_source.expose_secret();
    let accessor: SharedAccessor = match kind {
        BackendKind::Sqlite => {
            if data_source.is_empty() {
                return Err(StoreError::Configuration(
                    "no database specified".to_string(),
                ));
            }
            Arc::new(SqlAccessor::connect(data_source).await?)
        }
        BackendKind::Redis => Arc::new(KvAccessor::new(
            RedisHashStore::connect(data_source).await?,
        )),
        BackendKind::Memory => Arc::new(KvAccessor::new(MemoryHashStore::new())),
    };

    accessor.ping().await?;
    debug!(driver = %kind, "accessor created");
    Ok(accessor)
}
