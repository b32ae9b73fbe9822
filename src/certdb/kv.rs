use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::certdb::codec::{self, CERT_KEY_PREFIX, OCSP_KEY_PREFIX};
use crate::certdb::filter::{self, CertificateFilter};
use crate::certdb::record::{validate_identity, validate_reason};
use crate::certdb::{Accessor, CertificateRecord, OcspRecord, Result, StoreError};

mod memory;
mod redis;

pub use self::memory::MemoryHashStore;
pub use self::redis::RedisHashStore;

/// Minimal hash-per-key operations the key-value accessor needs from a backend.
#[async_trait]
pub trait HashStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Writes all given fields of the hash at `key`, creating it if needed.
    async fn set_fields(&self, key: &str, fields: &[(&'static str, String)]) -> Result<()>;

    /// Writes the given fields only if `key` already exists, as one atomic step.
    ///
    /// Returns whether the key existed.
    async fn set_fields_if_exists(&self, key: &str, fields: &[(&'static str, String)])
    -> Result<bool>;

    /// Reads every field of the hash at `key`. A missing key yields an empty map.
    async fn get_fields(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Lists keys matching a `prefix:*` glob.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Accessor over a key-value store without secondary indexes.
///
/// Every filtered query enumerates the whole `cert:` (or `ocsp:`) namespace and
/// evaluates the predicate on each decoded record, so the cost of a CRL generation
/// grows linearly with the number of stored certificates.
#[derive(Debug, Clone)]
pub struct KvAccessor<S> {
    store: S,
}

impl<S: HashStore> KvAccessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn scan_decode<T>(
        &self,
        prefix: &str,
        decode: impl Fn(&str, &HashMap<String, String>) -> Result<T> + Send + Sync,
    ) -> Result<Vec<T>> {
        let keys = self.store.scan_keys(&codec::scan_pattern(prefix)).await?;
        debug!(prefix, keys = keys.len(), "scanning key-value namespace");

        let mut records = Vec::new();
        for key in keys {
            let fields = self.store.get_fields(&key).await?;
            if fields.is_empty() {
                continue;
            }
            match decode(&key, &fields) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(key = %key, "aborting scan on corrupt record: {e}");
                    return Err(e);
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl<S: HashStore> Accessor for KvAccessor<S> {
    async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    async fn insert_certificate(&self, record: &CertificateRecord) -> Result<()> {
        record.validate()?;
        let key = codec::cert_key(&record.serial, &record.aki);
        self.store
            .set_fields(&key, &codec::encode_certificate(record))
            .await
    }

    async fn get_certificate(&self, serial: &str, aki: &str) -> Result<CertificateRecord> {
        validate_identity(serial, aki)?;
        let key = codec::cert_key(serial, aki);
        let fields = self.store.get_fields(&key).await?;
        if fields.is_empty() {
            return Err(StoreError::not_found("certificate", serial, aki));
        }
        codec::decode_certificate(&key, &fields)
    }

    async fn find_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CertificateRecord>> {
        let now = Utc::now();
        let records = self
            .scan_decode(CERT_KEY_PREFIX, codec::decode_certificate)
            .await?;
        Ok(records
            .into_iter()
            .filter(|record| filter.matches(record, &now))
            .collect())
    }

    async fn revoke_certificate(&self, serial: &str, aki: &str, reason: i32) -> Result<()> {
        validate_identity(serial, aki)?;
        validate_reason(reason)?;
        let key = codec::cert_key(serial, aki);
        let fields = codec::encode_revocation(reason, &Utc::now());
        if !self.store.set_fields_if_exists(&key, &fields).await? {
            return Err(StoreError::not_found("certificate", serial, aki));
        }
        Ok(())
    }

    async fn insert_ocsp(&self, record: &OcspRecord) -> Result<()> {
        record.validate()?;
        let key = codec::ocsp_key(&record.serial, &record.aki);
        self.store.set_fields(&key, &codec::encode_ocsp(record)).await
    }

    async fn get_ocsp(&self, serial: &str, aki: &str) -> Result<OcspRecord> {
        validate_identity(serial, aki)?;
        let key = codec::ocsp_key(serial, aki);
        let fields = self.store.get_fields(&key).await?;
        if fields.is_empty() {
            return Err(StoreError::not_found("OCSP response", serial, aki));
        }
        codec::decode_ocsp(&key, &fields)
    }

    async fn get_unexpired_ocsps(&self) -> Result<Vec<OcspRecord>> {
        let now = Utc::now();
        let records = self.scan_decode(OCSP_KEY_PREFIX, codec::decode_ocsp).await?;
        Ok(records
            .into_iter()
            .filter(|record| filter::unexpired_ocsp(record, &now))
            .collect())
    }

    async fn update_ocsp(
        &self,
        serial: &str,
        aki: &str,
        body: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        validate_identity(serial, aki)?;
        let record = OcspRecord::new(serial, aki, body, expiry);
        let key = codec::ocsp_key(serial, aki);
        if !self
            .store
            .set_fields_if_exists(&key, &codec::encode_ocsp(&record))
            .await?
        {
            return Err(StoreError::not_found("OCSP response", serial, aki));
        }
        Ok(())
    }

    async fn upsert_ocsp(
        &self,
        serial: &str,
        aki: &str,
        body: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        self.insert_ocsp(&OcspRecord::new(serial, aki, body, expiry))
            .await
    }
}
