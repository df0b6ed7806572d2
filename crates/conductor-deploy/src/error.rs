//! Error types for conductor-deploy.

use conductor_archive::ArchiveError;
use conductor_build::BuildError;
use conductor_pool::PoolError;
use conductor_teleport::TeleportError;

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that abort a deploy run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The deploy specification or configuration is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Packaging a unit failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Reading or writing an object failed.
    #[error("transfer failed for {key}: {message}")]
    Transfer {
        /// Storage key involved.
        key: String,
        /// Error message from the backend.
        message: String,
    },

    /// Delegated archive assembly failed.
    #[error("teleport failed: {0}")]
    Teleport(#[from] TeleportError),

    /// The infrastructure provider rejected the stack.
    #[error("stack {stack} failed to apply: {diagnostic}")]
    StackApply {
        /// Stack name.
        stack: String,
        /// Diagnostic reported by the provider, verbatim.
        diagnostic: String,
    },

    /// A code-update call failed.
    #[error("code update for {function} failed: {message}")]
    CodeUpdate {
        /// Physical name of the function.
        function: String,
        /// Error message.
        message: String,
    },

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a transfer error for `key`.
    pub fn transfer(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Transfer {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create a stack apply error.
    pub fn stack_apply(stack: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::StackApply {
            stack: stack.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Body of a failed response, for error messages. A body that cannot be
/// read is described instead of dropped.
pub(crate) async fn response_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(e) => format!("response body unreadable: {e}"),
    }
}

impl From<PoolError> for DeployError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::NotFound { key } => Self::Transfer {
                message: "object not found".to_owned(),
                key,
            },
            PoolError::Transfer { key, message } => Self::Transfer { key, message },
            PoolError::UnknownBucket(bucket) => {
                Self::Configuration(format!("no storage configured for bucket {bucket}"))
            }
            PoolError::Config(msg) => Self::Configuration(msg),
        }
    }
}

impl From<ArchiveError> for DeployError {
    fn from(err: ArchiveError) -> Self {
        Self::Build(BuildError::Archive(err))
    }
}

impl From<figment::Error> for DeployError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DeployError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("task failed: {err}"))
    }
}
