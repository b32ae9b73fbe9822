use thiserror::Error;

/// Errors returned by every [`Accessor`](super::Accessor) regardless of backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("certificate store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("corrupt record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("store configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl ToString) -> Self {
        StoreError::CorruptRecord {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn not_found(kind: &str, serial: &str, aki: &str) -> Self {
        StoreError::NotFound(format!("{kind} serial={serial} aki={aki}"))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound(error.to_string()),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. } => StoreError::corrupt("row", error),
            sqlx::Error::Configuration(_) => StoreError::Configuration(error.to_string()),
            _ => StoreError::StoreUnavailable(error.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        match error.kind() {
            redis::ErrorKind::TypeError => StoreError::corrupt("key", error),
            redis::ErrorKind::ExtensionError if error.code() == Some("WRONGTYPE") => {
                StoreError::corrupt("key", error)
            }
            redis::ErrorKind::InvalidClientConfig => StoreError::Configuration(error.to_string()),
            _ => StoreError::StoreUnavailable(error.to_string()),
        }
    }
}
