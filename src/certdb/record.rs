use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::certdb::StoreError;

/// Lifecycle status of an issued certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    #[default]
    Good,
    Revoked,
}

impl CertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Good => "good",
            CertStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(CertStatus::Good),
            "revoked" => Ok(CertStatus::Revoked),
            other => Err(StoreError::Validation(format!(
                "unrecognized certificate status {other:?}"
            ))),
        }
    }
}

/// CRLReason codes as defined in RFC 5280 §5.3.1.
///
/// Value 7 is not used by the RFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl RevocationReason {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Unspecified,
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            _ => return None,
        })
    }
}

impl FromStr for RevocationReason {
    type Err = StoreError;

    /// Accepts either a decimal reason code or a reason name such as `keyCompromise`
    /// (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i32>() {
            return Self::from_code(code)
                .ok_or_else(|| StoreError::Validation(format!("invalid reason code {code}")));
        }

        let reason = match s.to_ascii_lowercase().as_str() {
            "unspecified" => Self::Unspecified,
            "keycompromise" => Self::KeyCompromise,
            "cacompromise" => Self::CaCompromise,
            "affiliationchanged" => Self::AffiliationChanged,
            "superseded" => Self::Superseded,
            "cessationofoperation" => Self::CessationOfOperation,
            "certificatehold" => Self::CertificateHold,
            "removefromcrl" => Self::RemoveFromCrl,
            "privilegewithdrawn" => Self::PrivilegeWithdrawn,
            "aacompromise" => Self::AaCompromise,
            _ => {
                return Err(StoreError::Validation(format!(
                    "unknown revocation reason {s:?}"
                )));
            }
        };
        Ok(reason)
    }
}

/// A certificate issued by the CA together with its revocation state.
///
/// `(serial, aki)` identifies the record within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub serial: String,
    pub aki: String,
    pub ca_label: String,
    pub status: CertStatus,
    pub reason: i32,
    pub expiry: DateTime<Utc>,
    /// Only set once the certificate has been revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    pub pem: String,
}

impl CertificateRecord {
    /// Creates a freshly issued (`good`) record.
    pub fn new(
        serial: impl Into<String>,
        aki: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            serial: serial.into(),
            aki: aki.into(),
            ca_label: String::new(),
            status: CertStatus::Good,
            reason: 0,
            expiry,
            revoked_at: None,
            pem: String::new(),
        }
    }

    pub fn with_ca_label(mut self, label: impl Into<String>) -> Self {
        self.ca_label = label.into();
        self
    }

    pub fn with_pem(mut self, pem: impl Into<String>) -> Self {
        self.pem = pem.into();
        self
    }

    /// Marks the record revoked at the given instant.
    pub fn revoked(mut self, reason: RevocationReason, at: DateTime<Utc>) -> Self {
        self.status = CertStatus::Revoked;
        self.reason = reason.code();
        self.revoked_at = Some(at);
        self
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CertStatus::Revoked
    }

    /// Rejects records that cannot be stored.
    ///
    /// `revoked_at` must be set exactly when the record is revoked, and the
    /// reason must be a CRLReason code.
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_identity(&self.serial, &self.aki)?;
        validate_reason(self.reason)?;
        match (self.status, self.revoked_at) {
            (CertStatus::Revoked, None) => Err(StoreError::Validation(format!(
                "revoked certificate {} has no revocation time",
                self.serial
            ))),
            (CertStatus::Good, Some(_)) => Err(StoreError::Validation(format!(
                "certificate {} has a revocation time but is not revoked",
                self.serial
            ))),
            _ => Ok(()),
        }
    }
}

/// A cached OCSP response for one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcspRecord {
    pub serial: String,
    pub aki: String,
    pub body: String,
    pub expiry: DateTime<Utc>,
}

impl OcspRecord {
    pub fn new(
        serial: impl Into<String>,
        aki: impl Into<String>,
        body: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            serial: serial.into(),
            aki: aki.into(),
            body: body.into(),
            expiry,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        validate_identity(&self.serial, &self.aki)
    }
}

pub(crate) fn validate_identity(serial: &str, aki: &str) -> Result<(), StoreError> {
    if serial.is_empty() {
        return Err(StoreError::Validation("serial number is empty".to_string()));
    }
    // The first ':' after the key prefix ends the serial.
    if serial.contains(':') {
        return Err(StoreError::Validation(format!(
            "serial number {serial:?} contains ':'"
        )));
    }
    if aki.is_empty() {
        return Err(StoreError::Validation(
            "authority key identifier is empty".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_reason(code: i32) -> Result<RevocationReason, StoreError> {
    RevocationReason::from_code(code)
        .ok_or_else(|| StoreError::Validation(format!("invalid reason code {code}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_parsing() {
        assert_eq!("good".parse::<CertStatus>().unwrap(), CertStatus::Good);
        assert_eq!("revoked".parse::<CertStatus>().unwrap(), CertStatus::Revoked);
        assert!(matches!(
            "expired".parse::<CertStatus>(),
            Err(StoreError::Validation(_))
        ));
        assert!("Revoked".parse::<CertStatus>().is_err());
    }

    #[test]
    fn test_reason_parsing() {
        assert_eq!(
            "keyCompromise".parse::<RevocationReason>().unwrap(),
            RevocationReason::KeyCompromise
        );
        assert_eq!(
            "SUPERSEDED".parse::<RevocationReason>().unwrap(),
            RevocationReason::Superseded
        );
        assert_eq!(
            "10".parse::<RevocationReason>().unwrap(),
            RevocationReason::AaCompromise
        );
        assert!("7".parse::<RevocationReason>().is_err());
        assert!("stolen".parse::<RevocationReason>().is_err());
    }

    #[test]
    fn test_validation_rejects_missing_identity() {
        let expiry = Utc::now() + Duration::hours(1);

        assert!(CertificateRecord::new("1", "2", expiry).validate().is_ok());
        assert!(matches!(
            CertificateRecord::new("", "2", expiry).validate(),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            OcspRecord::new("1", "", "body", expiry).validate(),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            CertificateRecord::new("1:2", "3", expiry).validate(),
            Err(StoreError::Validation(_))
        ));
        assert!(CertificateRecord::new("1", "2:3", expiry).validate().is_ok());
    }

    #[test]
    fn test_validation_checks_revocation_state() {
        let now = Utc::now();
        let expiry = now + Duration::hours(1);

        let mut record = CertificateRecord::new("5", "aa", expiry);
        record.status = CertStatus::Revoked;
        assert!(matches!(record.validate(), Err(StoreError::Validation(_))));

        let mut record = CertificateRecord::new("5", "aa", expiry);
        record.revoked_at = Some(now);
        assert!(matches!(record.validate(), Err(StoreError::Validation(_))));

        let mut record =
            CertificateRecord::new("5", "aa", expiry).revoked(RevocationReason::Superseded, now);
        assert!(record.validate().is_ok());
        record.reason = 7;
        assert!(matches!(record.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_revoked_builder() {
        let now = Utc::now();
        let record = CertificateRecord::new("1", "2", now + Duration::hours(1))
            .revoked(RevocationReason::CaCompromise, now);

        assert!(record.is_revoked());
        assert_eq!(record.reason, 2);
        assert_eq!(record.revoked_at, Some(now));
    }
}
