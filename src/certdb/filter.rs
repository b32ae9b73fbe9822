//! Query predicates shared by every backend.
//!
//! The relational backend translates a [`CertificateFilter`] into a `WHERE` clause,
//! the key-value backend evaluates [`CertificateFilter::matches`] on each decoded
//! record. Both must select the same set for the same stored state.

use chrono::{DateTime, Utc};

use crate::certdb::{CertStatus, CertificateRecord, OcspRecord};

/// Selection of certificate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateFilter {
    /// `expiry > now`
    Unexpired,
    /// `status = revoked AND expiry > now`
    RevokedAndUnexpired,
    /// `status = revoked AND expiry > now AND ca_label = label`
    RevokedAndUnexpiredByLabel(String),
}

impl CertificateFilter {
    pub fn matches(&self, record: &CertificateRecord, now: &DateTime<Utc>) -> bool {
        match self {
            CertificateFilter::Unexpired => unexpired(&record.expiry, now),
            CertificateFilter::RevokedAndUnexpired => revoked_and_unexpired(record, now),
            CertificateFilter::RevokedAndUnexpiredByLabel(label) => {
                revoked_and_unexpired(record, now) && record.ca_label == *label
            }
        }
    }

    pub fn revoked_only(&self) -> bool {
        !matches!(self, CertificateFilter::Unexpired)
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            CertificateFilter::RevokedAndUnexpiredByLabel(label) => Some(label),
            _ => None,
        }
    }
}

pub fn unexpired(expiry: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
    expiry > now
}

pub fn revoked_and_unexpired(record: &CertificateRecord, now: &DateTime<Utc>) -> bool {
    record.status == CertStatus::Revoked && unexpired(&record.expiry, now)
}

pub fn unexpired_ocsp(record: &OcspRecord, now: &DateTime<Utc>) -> bool {
    unexpired(&record.expiry, now)
}
