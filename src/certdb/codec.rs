//! Key and field layout of records in a key-value store.
//!
//! A certificate lives under `cert:<serial>:<aki>` and an OCSP response under
//! `ocsp:<serial>:<aki>`. Each key holds a flat hash of string fields. Timestamps
//! are RFC3339 UTC strings with second resolution, numbers are decimal strings.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::certdb::{CertStatus, CertificateRecord, OcspRecord, StoreError};

pub const CERT_KEY_PREFIX: &str = "cert";
pub const OCSP_KEY_PREFIX: &str = "ocsp";

pub const SERIAL_NUMBER: &str = "serial_number";
pub const AUTHORITY_KEY_IDENTIFIER: &str = "authority_key_identifier";
pub const CA_LABEL: &str = "ca_label";
pub const STATUS: &str = "status";
pub const REASON: &str = "reason";
pub const EXPIRY: &str = "expiry";
pub const REVOKED_AT: &str = "revoked_at";
pub const PEM: &str = "pem";
pub const BODY: &str = "body";

/// Written in place of an absent `revoked_at` so the field is always a timestamp.
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

pub type Fields = Vec<(&'static str, String)>;

pub fn cert_key(serial: &str, aki: &str) -> String {
    format!("{CERT_KEY_PREFIX}:{serial}:{aki}")
}

pub fn ocsp_key(serial: &str, aki: &str) -> String {
    format!("{OCSP_KEY_PREFIX}:{serial}:{aki}")
}

/// Glob pattern matching every key of a namespace.
pub fn scan_pattern(prefix: &str) -> String {
    format!("{prefix}:*")
}

pub fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn decode_time(key: &str, field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(key, format!("field {field}: {e}")))
}

pub fn encode_revoked_at(revoked_at: Option<&DateTime<Utc>>) -> String {
    revoked_at.map_or_else(|| ZERO_TIME.to_string(), encode_time)
}

pub fn decode_revoked_at(key: &str, value: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    if value.is_empty() || value == ZERO_TIME {
        return Ok(None);
    }
    decode_time(key, REVOKED_AT, value).map(Some)
}

pub fn encode_certificate(record: &CertificateRecord) -> Fields {
    vec![
        (SERIAL_NUMBER, record.serial.clone()),
        (AUTHORITY_KEY_IDENTIFIER, record.aki.clone()),
        (CA_LABEL, record.ca_label.clone()),
        (STATUS, record.status.to_string()),
        (REASON, record.reason.to_string()),
        (EXPIRY, encode_time(&record.expiry)),
        (REVOKED_AT, encode_revoked_at(record.revoked_at.as_ref())),
        (PEM, record.pem.clone()),
    ]
}

/// Fields rewritten when a certificate is revoked.
pub fn encode_revocation(reason: i32, revoked_at: &DateTime<Utc>) -> Fields {
    vec![
        (STATUS, CertStatus::Revoked.to_string()),
        (REASON, reason.to_string()),
        (REVOKED_AT, encode_time(revoked_at)),
    ]
}

pub fn decode_certificate(
    key: &str,
    fields: &HashMap<String, String>,
) -> Result<CertificateRecord, StoreError> {
    let reason = required(key, fields, REASON)?
        .parse::<i32>()
        .map_err(|e| StoreError::corrupt(key, format!("field {REASON}: {e}")))?;
    let status = required(key, fields, STATUS)?
        .parse::<CertStatus>()
        .map_err(|e| StoreError::corrupt(key, e))?;

    Ok(CertificateRecord {
        serial: required(key, fields, SERIAL_NUMBER)?.to_string(),
        aki: required(key, fields, AUTHORITY_KEY_IDENTIFIER)?.to_string(),
        ca_label: optional(fields, CA_LABEL),
        status,
        reason,
        expiry: decode_time(key, EXPIRY, required(key, fields, EXPIRY)?)?,
        revoked_at: decode_revoked_at(key, fields.get(REVOKED_AT).map_or("", String::as_str))?,
        pem: optional(fields, PEM),
    })
}

pub fn encode_ocsp(record: &OcspRecord) -> Fields {
    vec![
        (SERIAL_NUMBER, record.serial.clone()),
        (AUTHORITY_KEY_IDENTIFIER, record.aki.clone()),
        (BODY, record.body.clone()),
        (EXPIRY, encode_time(&record.expiry)),
    ]
}

pub fn decode_ocsp(key: &str, fields: &HashMap<String, String>) -> Result<OcspRecord, StoreError> {
    Ok(OcspRecord {
        serial: required(key, fields, SERIAL_NUMBER)?.to_string(),
        aki: required(key, fields, AUTHORITY_KEY_IDENTIFIER)?.to_string(),
        body: optional(fields, BODY),
        expiry: decode_time(key, EXPIRY, required(key, fields, EXPIRY)?)?,
    })
}

fn required<'a>(
    key: &str,
    fields: &'a HashMap<String, String>,
    field: &str,
) -> Result<&'a str, StoreError> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| StoreError::corrupt(key, format!("missing field {field}")))
}

fn optional(fields: &HashMap<String, String>, field: &str) -> String {
    fields.get(field).cloned().unwrap_or_default()
}
