//! Error types for blob storage.

use thiserror::Error;

/// Errors that can occur reading or writing pooled objects.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No object exists at the key.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The object store rejected a read or write.
    #[error("transfer failed for {key}: {message}")]
    Transfer {
        /// Storage key involved.
        key: String,
        /// Error message from the backend.
        message: String,
    },

    /// A storage location referenced a bucket with no configured store.
    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    /// Storage configuration could not be turned into a store.
    #[error("storage configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Create a transfer error for `key`.
    pub fn transfer(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Transfer {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Translate an object store error, mapping missing objects to [`PoolError::NotFound`].
    pub(crate) fn from_store(key: &str, error: object_store::Error) -> Self {
        match error {
            object_store::Error::NotFound { .. } => Self::NotFound {
                key: key.to_owned(),
            },
            other => Self::transfer(key, other),
        }
    }

    /// Whether this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
