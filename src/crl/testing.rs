//! Throwaway CA material for tests.
//!
//! Compiled for unit tests and, with the `test-util` feature, for the
//! integration tests under `tests/`.

use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::extension::{BasicConstraints, SubjectKeyIdentifier};
use openssl::x509::{X509, X509NameBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaKind {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

pub struct TestCa {
    pub cert: X509,
    pub key: PKey<Private>,
}

impl TestCa {
    pub fn generate(kind: CaKind) -> Self {
        let key = match kind {
            CaKind::Rsa => PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap(),
            CaKind::EcP256 => ec_key(Nid::X9_62_PRIME256V1),
            CaKind::EcP384 => ec_key(Nid::SECP384R1),
            CaKind::Ed25519 => PKey::generate_ed25519().unwrap(),
        };

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, "Example CA")
            .unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, "Example Root")
            .unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(None, None))
            .unwrap();
        builder.append_extension(ski).unwrap();

        let digest = match kind {
            CaKind::Ed25519 => MessageDigest::null(),
            _ => MessageDigest::sha256(),
        };
        builder.sign(&key, digest).unwrap();

        Self {
            cert: builder.build(),
            key,
        }
    }

    pub fn cert_pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    pub fn key_pem(&self) -> Vec<u8> {
        self.key.private_key_to_pem_pkcs8().unwrap()
    }

    /// Writes `ca.pem` and `ca-key.pem` into `dir`, encrypting the key when a
    /// passphrase is given. Returns the certificate and key paths.
    pub fn write_to(&self, dir: &Path, passphrase: Option<&[u8]>) -> (PathBuf, PathBuf) {
        let cert_path = dir.join("ca.pem");
        let key_path = dir.join("ca-key.pem");
        let key_pem = match passphrase {
            Some(passphrase) => self
                .key
                .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), passphrase)
                .unwrap(),
            None => self.key_pem(),
        };
        std::fs::write(&cert_path, self.cert_pem()).unwrap();
        std::fs::write(&key_path, key_pem).unwrap();
        (cert_path, key_path)
    }
}

fn ec_key(curve: Nid) -> PKey<Private> {
    let group = EcGroup::from_curve_name(curve).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}
