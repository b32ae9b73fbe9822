//! Revocation-state store.
//!
//! [`Accessor`] is the single capability interface over the certificate and OCSP
//! record store. It is implemented by [`SqlAccessor`] (relational, predicates pushed
//! down to SQL) and [`KvAccessor`] (key-value, predicates evaluated client-side).
//! [`new_accessor`] picks one from a [`DbConfig`](crate::config::DbConfig).

mod errors;

pub mod codec;
pub mod factory;
pub mod filter;
pub mod kv;
pub mod record;
pub mod sql;

pub use errors::StoreError;
pub use factory::{BackendKind, new_accessor};
pub use filter::CertificateFilter;
pub use kv::{HashStore, KvAccessor, MemoryHashStore, RedisHashStore};
pub use record::{CertStatus, CertificateRecord, OcspRecord, RevocationReason};
pub use sql::SqlAccessor;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Shared handle to a backend chosen at runtime.
pub type SharedAccessor = Arc<dyn Accessor>;

/// Operations over the certificate and OCSP record store.
///
/// Every call is a full round trip to the backend. Records are identified by
/// `(serial, aki)`; inserts replace the whole record.
#[async_trait]
pub trait Accessor: Send + Sync {
    /// Checks that the backend can be reached.
    async fn ping(&self) -> Result<()>;

    /// Inserts a certificate, replacing any record with the same identity.
    async fn insert_certificate(&self, record: &CertificateRecord) -> Result<()>;

    /// Fetches one certificate, failing with [`StoreError::NotFound`] if absent.
    async fn get_certificate(&self, serial: &str, aki: &str) -> Result<CertificateRecord>;

    /// Returns every certificate selected by `filter`, in backend order.
    ///
    /// Fails as a whole on the first record that cannot be decoded. Key-value
    /// backends decode every scanned record; SQL only decodes matching rows.
    async fn find_certificates(&self, filter: &CertificateFilter)
    -> Result<Vec<CertificateRecord>>;

    async fn get_unexpired_certificates(&self) -> Result<Vec<CertificateRecord>> {
        self.find_certificates(&CertificateFilter::Unexpired).await
    }

    /// Certificates to list on a CRL.
    async fn get_revoked_and_unexpired_certificates(&self) -> Result<Vec<CertificateRecord>> {
        self.find_certificates(&CertificateFilter::RevokedAndUnexpired)
            .await
    }

    async fn get_revoked_and_unexpired_certificates_by_label(
        &self,
        label: &str,
    ) -> Result<Vec<CertificateRecord>> {
        self.find_certificates(&CertificateFilter::RevokedAndUnexpiredByLabel(
            label.to_string(),
        ))
        .await
    }

    /// Marks a certificate revoked with the given CRL reason code at the current time.
    ///
    /// Fails with [`StoreError::NotFound`] if the identity does not exist.
    async fn revoke_certificate(&self, serial: &str, aki: &str, reason: i32) -> Result<()>;

    /// Inserts an OCSP response, replacing any record with the same identity.
    async fn insert_ocsp(&self, record: &OcspRecord) -> Result<()>;

    async fn get_ocsp(&self, serial: &str, aki: &str) -> Result<OcspRecord>;

    async fn get_unexpired_ocsps(&self) -> Result<Vec<OcspRecord>>;

    /// Replaces body and expiry of an existing OCSP response.
    ///
    /// Fails with [`StoreError::NotFound`] if the identity does not exist.
    async fn update_ocsp(
        &self,
        serial: &str,
        aki: &str,
        body: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()>;

    /// Replaces or creates an OCSP response.
    async fn upsert_ocsp(
        &self,
        serial: &str,
        aki: &str,
        body: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()>;
}
