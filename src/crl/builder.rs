use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use const_oid::db::rfc5280;
use der::asn1::{Any, BitString, GeneralizedTime, OctetString, Uint, UtcTime};
use der::{Encode, ErrorKind, Tag};
use openssl::bn::BigNum;
use tracing::{debug, info};
use x509_cert::Version;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::AuthorityKeyIdentifier;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use super::errors::CrlResult;
use super::issuer::{CrlSigner, IssuerIdentity};
use crate::certdb::codec::cert_key;
use crate::certdb::{CertificateRecord, RevocationReason, StoreError};

/// Builds and signs a v2 CRL listing `records`, returning its DER encoding.
///
/// Entries are ordered by numeric serial so the output does not depend on the
/// order the store returned them in. An empty `records` yields a CRL with no
/// revoked certificates.
pub fn build_crl(
    issuer: &IssuerIdentity,
    signer: &dyn CrlSigner,
    records: &[CertificateRecord],
    this_update: DateTime<Utc>,
    next_update: DateTime<Utc>,
) -> CrlResult<Vec<u8>> {
    let mut entries = records
        .iter()
        .map(revoked_entry)
        .collect::<CrlResult<Vec<_>>>()?;
    // Minimal big-endian bytes: shorter is smaller, equal lengths compare bytewise.
    entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let revoked: Vec<RevokedCert> = entries.into_iter().map(|(_, entry)| entry).collect();

    let crl_number = this_update.timestamp();
    let mut extensions = vec![Extension {
        extn_id: rfc5280::ID_CE_CRL_NUMBER,
        critical: false,
        extn_value: OctetString::new(
            Uint::new(&crl_number.to_be_bytes())?.to_der()?,
        )?,
    }];
    if let Some(key_id) = &issuer.key_id {
        let aki = AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(key_id.clone())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        extensions.push(Extension {
            extn_id: rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER,
            critical: false,
            extn_value: OctetString::new(aki.to_der()?)?,
        });
    }

    let algorithm = signer.signature_algorithm()?;
    let entry_count = revoked.len();
    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: algorithm.clone(),
        issuer: issuer.name.clone(),
        this_update: to_time(&this_update)?,
        next_update: Some(to_time(&next_update)?),
        revoked_certificates: (!revoked.is_empty()).then_some(revoked),
        crl_extensions: Some(extensions),
    };

    let tbs_der = tbs_cert_list.to_der()?;
    debug!(tbs_len = tbs_der.len(), "signing CRL");
    let signature = signer.sign(&tbs_der)?;

    let crl = CertificateList {
        tbs_cert_list,
        signature_algorithm: algorithm,
        signature: BitString::from_bytes(&signature)?,
    };
    let der = crl.to_der()?;

    info!(
        entries = entry_count,
        crl_number,
        next_update = %next_update,
        "assembled CRL"
    );
    Ok(der)
}

fn revoked_entry(record: &CertificateRecord) -> CrlResult<(Vec<u8>, RevokedCert)> {
    let key = cert_key(&record.serial, &record.aki);
    let serial = serial_bytes(&key, &record.serial)?;
    let revoked_at = record
        .revoked_at
        .ok_or_else(|| StoreError::corrupt(&key, "revoked record has no revocation time"))?;

    let reason = RevocationReason::from_code(record.reason).ok_or_else(|| {
        StoreError::corrupt(&key, format!("unknown revocation reason {}", record.reason))
    })?;
    let entry_extensions = match reason {
        RevocationReason::Unspecified => None,
        reason => Some(vec![Extension {
            extn_id: rfc5280::ID_CE_CRL_REASONS,
            critical: false,
            extn_value: OctetString::new(
                Any::new(Tag::Enumerated, vec![reason.code() as u8])?.to_der()?,
            )?,
        }]),
    };

    let entry = RevokedCert {
        serial_number: SerialNumber::new(&serial)?,
        revocation_date: to_time(&revoked_at)?,
        crl_entry_extensions: entry_extensions,
    };
    Ok((serial, entry))
}

// Decimal serial to minimal big-endian bytes.
fn serial_bytes(key: &str, serial: &str) -> CrlResult<Vec<u8>> {
    if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::corrupt(key, format!("serial {serial:?} is not a decimal number")).into());
    }
    let number = BigNum::from_dec_str(serial).map_err(|e| StoreError::corrupt(key, e))?;
    let mut bytes = number.to_vec();
    if bytes.is_empty() {
        bytes.push(0);
    }
    Ok(bytes)
}

// UTCTime through 2049, GeneralizedTime after (RFC 5280 4.1.2.5).
fn to_time(at: &DateTime<Utc>) -> CrlResult<Time> {
    let secs = u64::try_from(at.timestamp()).map_err(|_| der::Error::from(ErrorKind::DateTime))?;
    let since_epoch = Duration::from_secs(secs);
    if at.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_unix_duration(since_epoch)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(
            since_epoch,
        )?))
    }
}
