use std::path::PathBuf;

use chrono::{Datelike, Duration, SubsecRound, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::builder::build_crl;
use super::errors::{CrlError, CrlResult};
use super::issuer::Issuer;
use crate::certdb::Accessor;

/// Validity window applied when none is requested.
pub fn default_expiry() -> Duration {
    Duration::weeks(1)
}

/// What to put in a CRL and which CA signs it.
#[derive(Debug, Clone)]
pub struct CrlRequest {
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    /// Passphrase for an encrypted CA key. Empty means none.
    pub passphrase: Option<SecretString>,
    /// Distance between `thisUpdate` and `nextUpdate`.
    pub expiry: Duration,
    /// Restrict entries to certificates issued under this CA label.
    pub label: Option<String>,
}

impl CrlRequest {
    pub fn new(ca_cert: impl Into<PathBuf>, ca_key: impl Into<PathBuf>) -> Self {
        Self {
            ca_cert: ca_cert.into(),
            ca_key: ca_key.into(),
            passphrase: None,
            expiry: default_expiry(),
            label: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Checks that CA material was named and the expiry is positive.
    ///
    /// Touches neither the filesystem nor the store.
    pub fn validate(&self) -> CrlResult<()> {
        if self.ca_cert.as_os_str().is_empty() {
            return Err(CrlError::Configuration(
                "missing CA certificate".to_string(),
            ));
        }
        if self.ca_key.as_os_str().is_empty() {
            return Err(CrlError::Configuration("missing CA key".to_string()));
        }
        if self.expiry <= Duration::zero() {
            return Err(CrlError::Configuration(format!(
                "CRL expiry must be positive, got {}",
                self.expiry
            )));
        }
        Ok(())
    }

    fn passphrase(&self) -> Option<&[u8]> {
        self.passphrase
            .as_ref()
            .map(|p| p.expose_secret().as_bytes())
            .filter(|p| !p.is_empty())
    }
}

/// Generates a signed CRL from the revoked, unexpired certificates in `accessor`.
///
/// The CA paths are checked before anything else, so a request without CA
/// material fails with [`CrlError::Configuration`] and the store is never
/// contacted. Any store failure aborts generation; nothing partial is returned.
pub async fn generate_crl(accessor: &dyn Accessor, request: &CrlRequest) -> CrlResult<Vec<u8>> {
    request.validate()?;

    let issuer = Issuer::load(&request.ca_cert, &request.ca_key, request.passphrase()).await?;

    let records = match &request.label {
        Some(label) => {
            accessor
                .get_revoked_and_unexpired_certificates_by_label(label)
                .await?
        }
        None => accessor.get_revoked_and_unexpired_certificates().await?,
    };
    debug!(
        revoked = records.len(),
        label = request.label.as_deref().unwrap_or(""),
        "fetched revoked certificates"
    );

    let this_update = Utc::now().trunc_subsecs(0);
    // GeneralizedTime cannot carry years past 9999.
    let next_update = this_update
        .checked_add_signed(request.expiry)
        .filter(|next| next.year() <= 9999)
        .ok_or_else(|| {
            CrlError::Configuration(format!("CRL expiry {} is out of range", request.expiry))
        })?;
    build_crl(
        issuer.identity(),
        issuer.signer(),
        &records,
        this_update,
        next_update,
    )
}
