use openssl::error::ErrorStack;
use thiserror::Error;

use crate::certdb::StoreError;

/// CRL generation errors
#[derive(Error, Debug)]
pub enum CrlError {
    /// Required CA material was not supplied
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The CA certificate or key could not be parsed
    #[error(transparent)]
    Parse(Box<dyn std::error::Error + Send + Sync>),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("DER encoding failed: {0}")]
    Encoding(#[from] der::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ErrorStack> for CrlError {
    fn from(err: ErrorStack) -> Self {
        CrlError::Signing(err.to_string())
    }
}

pub type CrlResult<T> = Result<T, CrlError>;
