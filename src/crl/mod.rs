//! Certificate Revocation List (CRL) generation
//!
//! Turns the revoked, unexpired records of a [`certdb`](crate::certdb) store
//! into a signed X.509 v2 CRL.

mod builder;
mod errors;
mod generate;
mod issuer;
#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod testing;

pub use builder::build_crl;
pub use errors::{CrlError, CrlResult};
pub use generate::{CrlRequest, default_expiry, generate_crl};
pub use issuer::{CrlSigner, Issuer, IssuerIdentity, OpenSslSigner};
