use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, Script};

use crate::certdb::Result;
use crate::certdb::kv::HashStore;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);
const SCAN_COUNT: usize = 1000;

// HSET only when the hash already exists, so a revocation never creates a partial record.
const SET_IF_EXISTS: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], unpack(ARGV))
    return 1
end
return 0
";

/// A Redis-backed hash store.
#[derive(Clone)]
pub struct RedisHashStore {
    conn: ConnectionManager,
    set_if_exists: Script,
}

impl RedisHashStore {
    /// Creates a store from an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            set_if_exists: Script::new(SET_IF_EXISTS),
        }
    }

    /// Establishes a new Redis connection based on the provided URI.
    ///
    /// - To enable TLS, the URI must use the `rediss://` scheme.
    /// - To enable insecure TLS, the URI must use the `rediss://` scheme and end with `/#insecure`.
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = Client::open(uri)?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(CONNECTION_TIMEOUT);
        let conn = client.get_connection_manager_with_config(config).await?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl HashStore for RedisHashStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_fields(&self, key: &str, fields: &[(&'static str, String)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn set_fields_if_exists(
        &self,
        key: &str,
        fields: &[(&'static str, String)],
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let mut invocation = self.set_if_exists.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }
        let updated: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(updated == 1)
    }

    async fn get_fields(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once.
        let mut keys = HashSet::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys.into_iter().collect())
    }
}
