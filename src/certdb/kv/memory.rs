use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::certdb::Result;
use crate::certdb::kv::HashStore;

/// An in-process hash store.
///
/// Useful for testing and for embedding without an external key-value server.
/// Only `prefix:*` scan patterns are understood.
#[derive(Debug, Default, Clone)]
pub struct MemoryHashStore {
    entries: Arc<DashMap<String, HashMap<String, String>>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn set_fields(&self, key: &str, fields: &[(&'static str, String)]) -> Result<()> {
        let mut entry = self.entries.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn set_fields_if_exists(
        &self,
        key: &str,
        fields: &[(&'static str, String)],
    ) -> Result<bool> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        for (field, value) in fields {
            entry.insert(field.to_string(), value.clone());
        }
        Ok(true)
    }

    async fn get_fields(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
