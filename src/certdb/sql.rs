use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::certdb::codec::{self, encode_time};
use crate::certdb::filter::CertificateFilter;
use crate::certdb::record::{validate_identity, validate_reason};
use crate::certdb::{
    Accessor, CertStatus, CertificateRecord, OcspRecord, Result, StoreError,
};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const CREATE_CERTIFICATES: &str = "
CREATE TABLE IF NOT EXISTS certificates (
    serial_number            TEXT NOT NULL,
    authority_key_identifier TEXT NOT NULL,
    ca_label                 TEXT NOT NULL DEFAULT '',
    status                   TEXT NOT NULL,
    reason                   INTEGER NOT NULL DEFAULT 0,
    expiry                   TEXT NOT NULL,
    revoked_at               TEXT,
    pem                      TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (serial_number, authority_key_identifier)
)";

const CREATE_OCSP_RESPONSES: &str = "
CREATE TABLE IF NOT EXISTS ocsp_responses (
    serial_number            TEXT NOT NULL,
    authority_key_identifier TEXT NOT NULL,
    body                     TEXT NOT NULL,
    expiry                   TEXT NOT NULL,
    PRIMARY KEY (serial_number, authority_key_identifier)
)";

const CERT_COLUMNS: &str =
    "serial_number, authority_key_identifier, ca_label, status, reason, expiry, revoked_at, pem";

const INSERT_CERTIFICATE: &str = "
INSERT INTO certificates
    (serial_number, authority_key_identifier, ca_label, status, reason, expiry, revoked_at, pem)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (serial_number, authority_key_identifier) DO UPDATE SET
    ca_label = excluded.ca_label,
    status = excluded.status,
    reason = excluded.reason,
    expiry = excluded.expiry,
    revoked_at = excluded.revoked_at,
    pem = excluded.pem";

const REVOKE_CERTIFICATE: &str = "
UPDATE certificates SET status = 'revoked', reason = ?1, revoked_at = ?2
WHERE serial_number = ?3 AND authority_key_identifier = ?4";

const UPSERT_OCSP: &str = "
INSERT INTO ocsp_responses (serial_number, authority_key_identifier, body, expiry)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (serial_number, authority_key_identifier) DO UPDATE SET
    body = excluded.body,
    expiry = excluded.expiry";

const UPDATE_OCSP: &str = "
UPDATE ocsp_responses SET body = ?1, expiry = ?2
WHERE serial_number = ?3 AND authority_key_identifier = ?4";

/// Accessor over a SQLite database.
///
/// Timestamps are stored with the same fixed-width RFC3339 encoding as the key-value
/// codec, which lets `expiry > ?` be evaluated by the database as a string comparison.
#[derive(Debug, Clone)]
pub struct SqlAccessor {
    pool: SqlitePool,
}

impl SqlAccessor {
    /// Wraps an existing pool. The schema is not touched.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if missing) the database at `data_source` and ensures the schema.
    ///
    /// In-memory databases are held on a single connection that is never recycled,
    /// otherwise each pooled connection would see its own empty database.
    pub async fn connect(data_source: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(data_source)?.create_if_missing(true);

        let pool_options = if is_in_memory(data_source) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(DEFAULT_MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await?;
        let accessor = Self::new(pool);
        accessor.migrate().await?;
        Ok(accessor)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_CERTIFICATES).execute(&self.pool).await?;
        sqlx::query(CREATE_OCSP_RESPONSES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_in_memory(data_source: &str) -> bool {
    data_source.contains(":memory:") || data_source.contains("mode=memory")
}

fn select_certificates(filter: &CertificateFilter) -> String {
    let mut sql = format!("SELECT {CERT_COLUMNS} FROM certificates WHERE expiry > ?1");
    if filter.revoked_only() {
        sql.push_str(" AND status = 'revoked'");
    }
    if filter.label().is_some() {
        sql.push_str(" AND ca_label = ?2");
    }
    sql
}

fn decode_certificate_row(row: &SqliteRow) -> Result<CertificateRecord> {
    let serial: String = row.try_get("serial_number")?;
    let aki: String = row.try_get("authority_key_identifier")?;
    let key = codec::cert_key(&serial, &aki);

    let status = row
        .try_get::<String, _>("status")?
        .parse::<CertStatus>()
        .map_err(|e| StoreError::corrupt(&key, e))?;
    let reason = i32::try_from(row.try_get::<i64, _>("reason")?)
        .map_err(|e| StoreError::corrupt(&key, format!("field {}: {e}", codec::REASON)))?;
    let expiry = codec::decode_time(&key, codec::EXPIRY, &row.try_get::<String, _>("expiry")?)?;
    let revoked_at = match row.try_get::<Option<String>, _>("revoked_at")? {
        Some(value) => codec::decode_revoked_at(&key, &value)?,
        None => None,
    };

    Ok(CertificateRecord {
        ca_label: row.try_get("ca_label")?,
        pem: row.try_get("pem")?,
        serial,
        aki,
        status,
        reason,
        expiry,
        revoked_at,
    })
}

fn decode_ocsp_row(row: &SqliteRow) -> Result<OcspRecord> {
    let serial: String = row.try_get("serial_number")?;
    let aki: String = row.try_get("authority_key_identifier")?;
    let key = codec::ocsp_key(&serial, &aki);
    let expiry = codec::decode_time(&key, codec::EXPIRY, &row.try_get::<String, _>("expiry")?)?;

    Ok(OcspRecord {
        body: row.try_get("body")?,
        serial,
        aki,
        expiry,
    })
}

#[async_trait]
impl Accessor for SqlAccessor {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_certificate(&self, record: &CertificateRecord) -> Result<()> {
        record.validate()?;
        sqlx::query(INSERT_CERTIFICATE)
            .bind(&record.serial)
            .bind(&record.aki)
            .bind(&record.ca_label)
            .bind(record.status.as_str())
            .bind(record.reason)
            .bind(encode_time(&record.expiry))
            .bind(record.revoked_at.as_ref().map(encode_time))
            .bind(&record.pem)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_certificate(&self, serial: &str, aki: &str) -> Result<CertificateRecord> {
        validate_identity(serial, aki)?;
        let sql = format!(
            "SELECT {CERT_COLUMNS} FROM certificates \
             WHERE serial_number = ?1 AND authority_key_identifier = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(serial)
            .bind(aki)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("certificate", serial, aki))?;
        decode_certificate_row(&row)
    }

    async fn find_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CertificateRecord>> {
        let sql = select_certificates(filter);
        debug!(?filter, "querying certificates");

        let mut query = sqlx::query(&sql).bind(encode_time(&Utc::now()));
        if let Some(label) = filter.label() {
            query = query.bind(label);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_certificate_row).collect()
    }

    async fn revoke_certificate(&self, serial: &str, aki: &str, reason: i32) -> Result<()> {
        validate_identity(serial, aki)?;
        validate_reason(reason)?;
        let result = sqlx::query(REVOKE_CERTIFICATE)
            .bind(reason)
            .bind(encode_time(&Utc::now()))
            .bind(serial)
            .bind(aki)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("certificate", serial, aki));
        }
        Ok(())
    }

    async fn insert_ocsp(&self, record: &OcspRecord) -> Result<()> {
        record.validate()?;
        sqlx::query(UPSERT_OCSP)
            .bind(&record.serial)
            .bind(&record.aki)
            .bind(&record.body)
            .bind(encode_time(&record.expiry))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_ocsp(&self, serial: &str, aki: &str) -> Result<OcspRecord> {
        validate_identity(serial, aki)?;
        let row = sqlx::query(
            "SELECT serial_number, authority_key_identifier, body, expiry FROM ocsp_responses \
             WHERE serial_number = ?1 AND authority_key_identifier = ?2",
        )
        .bind(serial)
        .bind(aki)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("OCSP response", serial, aki))?;
        decode_ocsp_row(&row)
    }

    async fn get_unexpired_ocsps(&self) -> Result<Vec<OcspRecord>> {
        let rows = sqlx::query(
            "SELECT serial_number, authority_key_identifier, body, expiry FROM ocsp_responses \
             WHERE expiry > ?1",
        )
        .bind(encode_time(&Utc::now()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_ocsp_row).collect()
    }

    async fn update_ocsp(
        &self,
        serial: &str,
        aki: &str,
        body: &str,
        expiry: DateTime<Utc>,
    ) -> Result<()> {
        validate_identity(serial, aki)?;
        let result = sqlx::query(UPDATE_OCSP)
            .bind(body)
            .bind(encode_time(&expiry))
            .bind(serial)
            .bind(aki)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_accessor() -> SqlAccessor {
        SqlAccessor::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn test_filter_pushdown() {
        assert_eq!(
            select_certificates(&CertificateFilter::Unexpired),
            format!("SELECT {CERT_COLUMNS} FROM certificates WHERE expiry > ?1")
        );
        assert!(
            select_certificates(&CertificateFilter::RevokedAndUnexpired)
                .ends_with("WHERE expiry > ?1 AND status = 'revoked'")
        );
        assert!(
            select_certificates(&CertificateFilter::RevokedAndUnexpiredByLabel("a".into()))
                .ends_with("AND status = 'revoked' AND ca_label = ?2")
        );
    }

    #[test]
    fn test_in_memory_detection() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("file:certs?mode=memory&cache=shared"));
        assert!(!is_in_memory("certs.db"));
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let accessor = memory_accessor().await;
        accessor.migrate().await.unwrap();
        accessor.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_unrevoked_row_stores_null_revoked_at() {
        let accessor = memory_accessor().await;
        let record = CertificateRecord::new("1", "2", Utc::now() + Duration::hours(1));
        accessor.insert_certificate(&record).await.unwrap();

        let revoked_at: Option<String> =
            sqlx::query_scalar("SELECT revoked_at FROM certificates WHERE serial_number = '1'")
                .fetch_one(accessor.pool())
                .await
                .unwrap();
        assert_eq!(revoked_at, None);
    }

    #[tokio::test]
    async fn test_corrupt_expiry_fails_the_scan() {
        let accessor = memory_accessor().await;
        sqlx::query(
            "INSERT INTO certificates (serial_number, authority_key_identifier, status, expiry) \
             VALUES ('1', '2', 'revoked', '9999-not-a-date')",
        )
        .execute(accessor.pool())
        .await
        .unwrap();

        assert!(matches!(
            accessor.get_revoked_and_unexpired_certificates().await,
            Err(StoreError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_is_corrupt() {
        let accessor = memory_accessor().await;
        sqlx::query(
            "INSERT INTO certificates (serial_number, authority_key_identifier, status, expiry) \
             VALUES ('1', '2', 'suspended', '2999-01-01T00:00:00Z')",
        )
        .execute(accessor.pool())
        .await
        .unwrap();

        assert!(matches!(
            accessor.get_certificate("1", "2").await,
            Err(StoreError::CorruptRecord { .. })
        ));
    }
}
