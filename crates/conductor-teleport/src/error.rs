//! Error types for teleportation.

use conductor_archive::ArchiveError;
use conductor_pool::{PoolError, StorageLocation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fragment that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentFailure {
    /// The unreadable fragment.
    pub location: StorageLocation,
    /// Why it could not be read.
    pub message: String,
}

/// Errors that can occur while merging fragments.
#[derive(Debug, Error)]
pub enum TeleportError {
    /// One or more fragments could not be fetched. No output was written.
    #[error("failed to read {} fragment(s): {}", failed.len(), describe(failed))]
    Transfer {
        /// Every fragment that failed.
        failed: Vec<FragmentFailure>,
    },

    /// A fetched fragment is not a valid archive.
    #[error("fragment {location} is not a valid archive: {source}")]
    Decode {
        /// The offending fragment.
        location: StorageLocation,
        /// Decoding failure.
        #[source]
        source: ArchiveError,
    },

    /// Fragments could not be merged.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Writing the merged archive failed.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The request is malformed.
    #[error("invalid teleport request: {0}")]
    InvalidRequest(String),

    /// The remote merge reported a failure.
    #[error("remote merge failed with status {status}: {message}")]
    Remote {
        /// Status code reported by the remote side.
        status: u16,
        /// Remote diagnostic.
        message: String,
    },

    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn describe(failed: &[FragmentFailure]) -> String {
    failed
        .iter()
        .map(|f| format!("{} ({})", f.location, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<figment::Error> for TeleportError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type alias for teleport operations.
pub type TeleportResult<T> = Result<T, TeleportError>;
