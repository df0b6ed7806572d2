//! Error types for dependency resolution and packaging.

use std::path::PathBuf;

use conductor_archive::ArchiveError;
use thiserror::Error;

/// Errors that can occur while resolving dependencies or packaging a unit.
#[derive(Debug, Error)]
pub enum BuildError {
    // ─────────────────────────────────────────────────────────────────────────
    // Dependency resolution errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A package was reached during traversal but no installation root has it.
    #[error("unresolved package {package} (searched {root})")]
    UnresolvedPackage {
        /// Package name.
        package: String,
        /// Root the package was requested from, or the searched roots.
        root: String,
    },

    /// The dependency graph names a package that is not installed on disk.
    #[error("missing install directory for {package}: {}", path.display())]
    MissingInstallDirectory {
        /// Package name.
        package: String,
        /// Expected directory.
        path: PathBuf,
    },

    /// The dependency graph of a root could not be obtained.
    #[error("failed to read dependency graph of {}: {message}", root.display())]
    DependencyGraph {
        /// Installation root.
        root: PathBuf,
        /// Error message.
        message: String,
    },

    /// A package version is not valid semver.
    #[error("invalid version {version:?} for package {package}")]
    InvalidVersion {
        /// Package name.
        package: String,
        /// The unparseable version.
        version: String,
    },

    /// Installation roots must be absolute.
    #[error("installation root is not absolute: {}", .0.display())]
    RelativeRoot(PathBuf),

    // ─────────────────────────────────────────────────────────────────────────
    // Packaging errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The compiler rejected the unit's sources.
    #[error("compilation failed: {0}")]
    Compile(String),

    /// Archive construction failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Packaging a unit failed. Wraps the underlying failure with its context.
    #[error("failed to package {unit} (root {}, context {package_context}): {source}", root_dir.display())]
    Packaging {
        /// Unit name.
        unit: String,
        /// Unit root directory.
        root_dir: PathBuf,
        /// Package context the unit was built in.
        package_context: String,
        /// Underlying failure.
        #[source]
        source: Box<BuildError>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Internal errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BuildError {
    /// Wrap `self` with the identity of the unit being packaged.
    ///
    /// Already wrapped errors are returned unchanged.
    #[must_use]
    pub fn packaging(
        self,
        unit: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        package_context: impl Into<String>,
    ) -> Self {
        match self {
            wrapped @ Self::Packaging { .. } => wrapped,
            source => Self::Packaging {
                unit: unit.into(),
                root_dir: root_dir.into(),
                package_context: package_context.into(),
                source: Box::new(source),
            },
        }
    }

    /// The innermost error, looking through packaging context.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Packaging { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<tokio::task::JoinError> for BuildError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {e}"))
    }
}

/// Result type alias for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packaging_context_wraps_once() {
        let err = BuildError::Compile("syntax error".to_owned())
            .packaging("api", "/srv/api", "default")
            .packaging("other", "/elsewhere", "ignored");

        match &err {
            BuildError::Packaging { unit, .. } => assert_eq!(unit, "api"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(err.root_cause(), BuildError::Compile(_)));
        assert!(err.to_string().contains("/srv/api"));
    }
}
