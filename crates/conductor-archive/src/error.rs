//! Error types for archive construction.

use thiserror::Error;

/// Errors raised while building, encoding or decoding archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An atom with this path already exists in the fragment.
    #[error("duplicate path: {path}")]
    DuplicatePath {
        /// The colliding path.
        path: String,
    },

    /// Two merged archives define the same internal path.
    #[error("archive conflict: {path} is defined by more than one fragment")]
    ArchiveConflict {
        /// The colliding path.
        path: String,
    },

    /// Atom path is not a normalised relative path.
    #[error("invalid atom path {path:?}: {reason}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// A path is used both as a file and as a parent directory.
    #[error("path {path} is both a file and a directory")]
    NotADirectory {
        /// The clashing path.
        path: String,
    },

    /// Encoded archive bytes could not be interpreted.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// Zip encoding failed.
    #[error("zip encoding failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O failure while encoding or decoding.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
