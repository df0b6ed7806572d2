//! Installation roots and package relevance.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BuildError, BuildResult};

/// The ordered list of directories whose installed packages can satisfy a
/// unit's dependencies.
///
/// Constructed once at startup and passed down; earlier roots take precedence
/// when two roots install equally good versions of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRoots(Vec<PathBuf>);

impl InstallRoots {
    /// Create from absolute paths.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::RelativeRoot`] for any relative path.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> BuildResult<Self> {
        let mut out: Vec<PathBuf> = Vec::new();
        for root in roots {
            if !root.is_absolute() {
                return Err(BuildError::RelativeRoot(root));
            }
            if !out.contains(&root) {
                out.push(root);
            }
        }
        Ok(Self(out))
    }

    /// Resolve possibly relative paths against `base`.
    pub fn resolve(roots: impl IntoIterator<Item = PathBuf>, base: &Path) -> BuildResult<Self> {
        Self::new(roots.into_iter().map(|root| {
            if root.is_absolute() {
                root
            } else {
                base.join(root)
            }
        }))
    }

    /// Iterate roots in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    /// Position of `root` in precedence order.
    #[must_use]
    pub fn rank(&self, root: &Path) -> Option<usize> {
        self.0.iter().position(|r| r == root)
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no roots are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for InstallRoots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{joined}]")
    }
}

/// Decides which packages are bundled with a unit. Rejected packages are
/// assumed to be provided by the runtime and are not traversed.
#[derive(Clone)]
pub struct PackageFilter {
    accepts: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl PackageFilter {
    /// Bundle every package.
    #[must_use]
    pub fn all() -> Self {
        Self::from_fn(|_| true)
    }

    /// Bundle everything except the listed packages.
    ///
    /// An entry ending in `/*` excludes a whole scope, e.g. `@aws-sdk/*`.
    pub fn excluding<I, S>(external: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = BTreeSet::new();
        let mut scopes = Vec::new();
        for entry in external {
            let entry = entry.into();
            match entry.strip_suffix("/*") {
                Some(scope) => scopes.push(format!("{scope}/")),
                None => {
                    names.insert(entry);
                }
            }
        }
        Self::from_fn(move |name| {
            !names.contains(name) && !scopes.iter().any(|s| name.starts_with(s.as_str()))
        })
    }

    /// Use an arbitrary predicate.
    pub fn from_fn(accepts: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            accepts: Arc::new(accepts),
        }
    }

    /// Whether `package` should be bundled.
    #[must_use]
    pub fn accepts(&self, package: &str) -> bool {
        (self.accepts)(package)
    }
}

impl Default for PackageFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for PackageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageFilter").finish_non_exhaustive()
    }
}

/// Reduce an import specifier to the package that owns it.
///
/// `lodash/fp/map` becomes `lodash` and `@scope/pkg/sub` becomes `@scope/pkg`.
#[must_use]
pub fn owning_package(specifier: &str) -> &str {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier.match_indices('/').nth(segments - 1) {
        Some((index, _)) => &specifier[..index],
        None => specifier,
    }
}
