#![allow(dead_code)]

use std::path::PathBuf;

use certdb::crl::testing::{CaKind, TestCa};
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tempfile::TempDir;

/// A generated CA written to a temporary directory.
pub struct CaFiles {
    pub dir: TempDir,
    pub cert: X509,
    pub key: PKey<Private>,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Writes a fresh CA of `kind`. The key is encrypted when `passphrase` is given.
pub fn write_ca(kind: CaKind, passphrase: Option<&[u8]>) -> CaFiles {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::generate(kind);
    let (cert_path, key_path) = ca.write_to(dir.path(), passphrase);

    CaFiles {
        dir,
        cert: ca.cert,
        key: ca.key,
        cert_path,
        key_path,
    }
}
