use std::fmt;
use std::path::Path;

use const_oid::db::{rfc5912, rfc8410};
use der::Decode;
use der::asn1::Any;
use openssl::hash::MessageDigest;
use openssl::pkey::{Id, PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use spki::AlgorithmIdentifierOwned;
use tracing::debug;
use x509_cert::name::Name;

use super::errors::{CrlError, CrlResult};

/// Produces the signature over an encoded `TBSCertList`.
pub trait CrlSigner: Send + Sync {
    /// Algorithm identifier written into both the TBS body and the outer CRL.
    fn signature_algorithm(&self) -> CrlResult<AlgorithmIdentifierOwned>;

    fn sign(&self, tbs_der: &[u8]) -> CrlResult<Vec<u8>>;
}

/// The parts of the CA certificate a CRL refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerIdentity {
    /// Subject of the CA certificate, used as the CRL issuer.
    pub name: Name,
    /// Subject Key Identifier of the CA, if the certificate carries one.
    pub key_id: Option<Vec<u8>>,
}

impl IssuerIdentity {
    pub fn from_certificate(cert: &X509) -> CrlResult<Self> {
        let subject = cert.subject_name().to_der().map_err(parse_error)?;
        let name = Name::from_der(&subject).map_err(parse_error)?;
        let key_id = cert.subject_key_id().map(|id| id.as_slice().to_vec());
        Ok(Self { name, key_id })
    }
}

/// Signs with an in-memory openssl private key.
pub struct OpenSslSigner {
    key: PKey<Private>,
}

impl OpenSslSigner {
    pub fn new(key: PKey<Private>) -> Self {
        Self { key }
    }

    // Digest paired with the key type; `None` for schemes that hash internally.
    fn scheme(&self) -> CrlResult<(AlgorithmIdentifierOwned, Option<MessageDigest>)> {
        match self.key.id() {
            Id::RSA => Ok((
                AlgorithmIdentifierOwned {
                    oid: rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                    parameters: Some(Any::from_der(&[0x05, 0x00])?),
                },
                Some(MessageDigest::sha256()),
            )),
            Id::EC => {
                let (oid, digest) = match self.key.bits() {
                    0..=256 => (rfc5912::ECDSA_WITH_SHA_256, MessageDigest::sha256()),
                    257..=384 => (rfc5912::ECDSA_WITH_SHA_384, MessageDigest::sha384()),
                    _ => (rfc5912::ECDSA_WITH_SHA_512, MessageDigest::sha512()),
                };
                Ok((
                    AlgorithmIdentifierOwned {
                        oid,
                        parameters: None,
                    },
                    Some(digest),
                ))
            }
            Id::ED25519 => Ok((
                AlgorithmIdentifierOwned {
                    oid: rfc8410::ID_ED_25519,
                    parameters: None,
                },
                None,
            )),
            other => Err(CrlError::Signing(format!(
                "unsupported CA key type {other:?}"
            ))),
        }
    }
}

impl CrlSigner for OpenSslSigner {
    fn signature_algorithm(&self) -> CrlResult<AlgorithmIdentifierOwned> {
        self.scheme().map(|(algorithm, _)| algorithm)
    }

    fn sign(&self, tbs_der: &[u8]) -> CrlResult<Vec<u8>> {
        let (_, digest) = self.scheme()?;
        let mut signer = match digest {
            Some(digest) => Signer::new(digest, &self.key)?,
            None => Signer::new_without_digest(&self.key)?,
        };
        Ok(signer.sign_oneshot_to_vec(tbs_der)?)
    }
}

impl fmt::Debug for OpenSslSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSslSigner")
            .field("key_type", &self.key.id())
            .field("bits", &self.key.bits())
            .finish()
    }
}

/// A loaded CA: its identity plus a signer for its private key.
#[derive(Debug)]
pub struct Issuer {
    identity: IssuerIdentity,
    signer: OpenSslSigner,
}

impl Issuer {
    /// Parses a PEM certificate and PEM private key.
    ///
    /// An encrypted key needs `passphrase`. Parse failures are returned as
    /// [`CrlError::Parse`] carrying the underlying error untouched.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], passphrase: Option<&[u8]>) -> CrlResult<Self> {
        let cert = X509::from_pem(cert_pem).map_err(parse_error)?;
        // An empty passphrase keeps openssl from prompting on a terminal.
        let key = PKey::private_key_from_pem_passphrase(key_pem, passphrase.unwrap_or_default())
            .map_err(parse_error)?;

        let public = cert.public_key().map_err(parse_error)?;
        if !public.public_eq(&key) {
            return Err(CrlError::Configuration(
                "CA key does not match CA certificate".to_string(),
            ));
        }

        let identity = IssuerIdentity::from_certificate(&cert)?;
        debug!(
            key_type = ?key.id(),
            key_id = identity.key_id.as_deref().map(hex::encode).unwrap_or_default(),
            "loaded CA"
        );
        Ok(Self {
            identity,
            signer: OpenSslSigner::new(key),
        })
    }

    /// Reads the CA certificate and key from disk.
    pub async fn load(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
        passphrase: Option<&[u8]>,
    ) -> CrlResult<Self> {
        let cert_pem = read(cert_path.as_ref()).await?;
        let key_pem = read(key_path.as_ref()).await?;
        Self::from_pem(&cert_pem, &key_pem, passphrase)
    }

    pub fn identity(&self) -> &IssuerIdentity {
        &self.identity
    }

    pub fn signer(&self) -> &OpenSslSigner {
        &self.signer
    }
}

async fn read(path: &Path) -> CrlResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|source| CrlError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_error(err: impl std::error::Error + Send + Sync + 'static) -> CrlError {
    CrlError::Parse(Box::new(err))
}
