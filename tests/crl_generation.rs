mod common;

use async_trait::async_trait;
use certdb::certdb::{
    Accessor, CertificateFilter, CertificateRecord, KvAccessor, MemoryHashStore, OcspRecord,
    Result as StoreResult, RevocationReason, StoreError, new_accessor,
};
use certdb::config::DbConfig;
use certdb::crl::{CrlError, CrlRequest, generate_crl};
use chrono::{DateTime, Duration, Utc};
use der::Decode;
use mockall::{mock, predicate};
use openssl::x509::X509Crl;
use secrecy::SecretString;
use x509_cert::crl::CertificateList;

use certdb::crl::testing::CaKind;
use common::write_ca;

mock! {
    pub Store {}

    #[async_trait]
    impl Accessor for Store {
        async fn ping(&self) -> StoreResult<()>;
        async fn insert_certificate(&self, record: &CertificateRecord) -> StoreResult<()>;
        async fn get_certificate(&self, serial: &str, aki: &str) -> StoreResult<CertificateRecord>;
        async fn find_certificates(
            &self,
            filter: &CertificateFilter,
        ) -> StoreResult<Vec<CertificateRecord>>;
        async fn get_unexpired_certificates(&self) -> StoreResult<Vec<CertificateRecord>>;
        async fn get_revoked_and_unexpired_certificates(
            &self,
        ) -> StoreResult<Vec<CertificateRecord>>;
        async fn get_revoked_and_unexpired_certificates_by_label(
            &self,
            label: &str,
        ) -> StoreResult<Vec<CertificateRecord>>;
        async fn revoke_certificate(&self, serial: &str, aki: &str, reason: i32) -> StoreResult<()>;
        async fn insert_ocsp(&self, record: &OcspRecord) -> StoreResult<()>;
        async fn get_ocsp(&self, serial: &str, aki: &str) -> StoreResult<OcspRecord>;
        async fn get_unexpired_ocsps(&self) -> StoreResult<Vec<OcspRecord>>;
        async fn update_ocsp(
            &self,
            serial: &str,
            aki: &str,
            body: &str,
            expiry: DateTime<Utc>,
        ) -> StoreResult<()>;
        async fn upsert_ocsp(
            &self,
            serial: &str,
            aki: &str,
            body: &str,
            expiry: DateTime<Utc>,
        ) -> StoreResult<()>;
    }
}

/// A store that must not be touched at all.
fn untouchable_store() -> MockStore {
    let mut store = MockStore::new();
    store.expect_ping().never();
    store.expect_find_certificates().never();
    store.expect_get_revoked_and_unexpired_certificates().never();
    store
        .expect_get_revoked_and_unexpired_certificates_by_label()
        .never();
    store
}

fn revoked_serials(der: &[u8]) -> Vec<String> {
    let crl = X509Crl::from_der(der).unwrap();
    let mut serials: Vec<String> = crl
        .get_revoked()
        .map(|revoked| {
            revoked
                .iter()
                .map(|entry| {
                    entry
                        .serial_number()
                        .to_bn()
                        .unwrap()
                        .to_dec_str()
                        .unwrap()
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();
    serials.sort();
    serials
}

fn revoked(serial: &str, aki: &str, label: &str, expiry: DateTime<Utc>) -> CertificateRecord {
    CertificateRecord::new(serial, aki, expiry)
        .with_ca_label(label)
        .revoked(RevocationReason::KeyCompromise, Utc::now() - Duration::minutes(10))
}

#[tokio::test]
async fn test_missing_ca_certificate_never_contacts_store() {
    let ca = write_ca(CaKind::Rsa, None);
    let store = untouchable_store();

    let request = CrlRequest::new("", &ca.key_path);
    let result = generate_crl(&store, &request).await;

    assert!(matches!(
        result,
        Err(CrlError::Configuration(ref msg)) if msg == "missing CA certificate"
    ));
}

#[tokio::test]
async fn test_missing_ca_key_never_contacts_store() {
    let ca = write_ca(CaKind::Rsa, None);
    let store = untouchable_store();

    let request = CrlRequest::new(&ca.cert_path, "");
    assert!(matches!(
        generate_crl(&store, &request).await,
        Err(CrlError::Configuration(ref msg)) if msg == "missing CA key"
    ));
}

#[tokio::test]
async fn test_malformed_ca_never_contacts_store() {
    let ca = write_ca(CaKind::Rsa, None);
    std::fs::write(&ca.cert_path, b"-----BEGIN CERTIFICATE-----\ngarbage\n").unwrap();
    let store = untouchable_store();

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path);
    assert!(matches!(
        generate_crl(&store, &request).await,
        Err(CrlError::Parse(_))
    ));
}

#[tokio::test]
async fn test_empty_store_yields_empty_crl() {
    let ca = write_ca(CaKind::Rsa, None);
    let accessor = new_accessor(&DbConfig::new("sqlite3", "sqlite::memory:"))
        .await
        .unwrap();

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path);
    let der = generate_crl(accessor.as_ref(), &request).await.unwrap();

    let crl = X509Crl::from_der(&der).unwrap();
    assert!(crl.verify(&ca.key).unwrap());
    assert!(crl.get_revoked().is_none());
    assert_eq!(
        crl.issuer_name().to_der().unwrap(),
        ca.cert.subject_name().to_der().unwrap()
    );
}

#[tokio::test]
async fn test_crl_lists_revoked_unexpired_certificates() {
    let ca = write_ca(CaKind::EcP256, None);
    let accessor = KvAccessor::new(MemoryHashStore::new());
    let later = Utc::now() + Duration::days(30);
    let earlier = Utc::now() - Duration::days(1);

    for record in [
        revoked("100", "aa", "root", later),
        revoked("7", "aa", "root", later),
        revoked("8", "aa", "root", earlier),
        CertificateRecord::new("9", "aa", later).with_ca_label("root"),
        revoked("55", "bb", "intermediate", later),
    ] {
        accessor.insert_certificate(&record).await.unwrap();
    }

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path);
    let der = generate_crl(&accessor, &request).await.unwrap();

    assert!(X509Crl::from_der(&der).unwrap().verify(&ca.key).unwrap());
    assert_eq!(revoked_serials(&der), vec!["100", "55", "7"]);
}

#[tokio::test]
async fn test_label_scopes_entries() {
    let ca = write_ca(CaKind::Rsa, None);
    let later = Utc::now() + Duration::days(30);
    let records = vec![revoked("12", "aa", "root", later)];

    let mut store = MockStore::new();
    store
        .expect_get_revoked_and_unexpired_certificates_by_label()
        .with(predicate::eq("root"))
        .times(1)
        .returning(move |_| Ok(records.clone()));
    store.expect_get_revoked_and_unexpired_certificates().never();

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path).with_label("root");
    let der = generate_crl(&store, &request).await.unwrap();
    assert_eq!(revoked_serials(&der), vec!["12"]);
}

#[tokio::test]
async fn test_store_failure_aborts_generation() {
    let ca = write_ca(CaKind::Rsa, None);
    let mut store = MockStore::new();
    store
        .expect_get_revoked_and_unexpired_certificates()
        .times(1)
        .returning(|| {
            Err(StoreError::StoreUnavailable(
                "connection refused".to_string(),
            ))
        });

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path);
    assert!(matches!(
        generate_crl(&store, &request).await,
        Err(CrlError::Store(StoreError::StoreUnavailable(_)))
    ));
}

#[tokio::test]
async fn test_validity_window_follows_expiry() {
    let ca = write_ca(CaKind::Rsa, None);
    let accessor = KvAccessor::new(MemoryHashStore::new());

    let request = CrlRequest::new(&ca.cert_path, &ca.key_path).with_expiry(Duration::hours(36));
    let der = generate_crl(&accessor, &request).await.unwrap();

    let crl = CertificateList::from_der(&der).unwrap();
    let this_update = crl.tbs_cert_list.this_update.to_unix_duration();
    let next_update = crl.tbs_cert_list.next_update.unwrap().to_unix_duration();
    assert_eq!((next_update - this_update).as_secs(), 36 * 3600);
}

#[tokio::test]
async fn test_encrypted_ca_key() {
    let ca = write_ca(CaKind::Rsa, Some(b"correct horse"));
    let accessor = KvAccessor::new(MemoryHashStore::new());

    let without = CrlRequest::new(&ca.cert_path, &ca.key_path);
    assert!(matches!(
        generate_crl(&accessor, &without).await,
        Err(CrlError::Parse(_))
    ));

    let with = without.with_passphrase(SecretString::from("correct horse".to_string()));
    let der = generate_crl(&accessor, &with).await.unwrap();
    assert!(X509Crl::from_der(&der).unwrap().verify(&ca.key).unwrap());
}
