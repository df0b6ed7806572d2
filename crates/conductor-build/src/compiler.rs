//! Turning a unit's source tree into code atoms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use conductor_archive::Atom;
use serde::Deserialize;
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::error::{BuildError, BuildResult};
use crate::tree::{collect_tree, TreeFilter};

/// What compiling a unit produced.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// Code atoms, relative to the unit root.
    pub atoms: Vec<Atom>,
    /// Third-party packages the code imports.
    pub packages: Vec<String>,
}

/// Compiles a unit's entry point.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile the unit rooted at `root_dir` whose entry point is `entry_point`.
    async fn compile(&self, root_dir: &Path, entry_point: &str) -> BuildResult<CompileOutput>;
}

#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// Ships the source tree as-is.
///
/// Every file below the unit root is taken except installed packages, hidden
/// directories and configured excludes. Imported packages are the
/// `dependencies` of the root's `package.json`.
#[derive(Debug, Clone, Default)]
pub struct SourceTreeCompiler {
    excludes: Vec<String>,
}

impl SourceTreeCompiler {
    /// Create a compiler that also skips the named directories.
    #[must_use]
    pub fn new(excludes: Vec<String>) -> Self {
        Self { excludes }
    }
}

#[async_trait]
impl Compiler for SourceTreeCompiler {
    async fn compile(&self, root_dir: &Path, entry_point: &str) -> BuildResult<CompileOutput> {
        let entry = root_dir.join(entry_point);
        if !entry.is_file() {
            return Err(BuildError::Compile(format!(
                "entry point {} does not exist",
                entry.display()
            )));
        }

        let root: PathBuf = root_dir.to_owned();
        let filter = TreeFilter::sources(&self.excludes);
        let atoms = spawn_blocking(move || collect_tree(&root, "", &filter)).await??;

        let manifest_path = root_dir.join("package.json");
        let manifest = match tokio::fs::read(&manifest_path).await {
            Ok(raw) => serde_json::from_slice::<PackageManifest>(&raw).map_err(|e| {
                BuildError::Compile(format!("invalid {}: {e}", manifest_path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PackageManifest::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            root = %root_dir.display(),
            files = atoms.len(),
            packages = manifest.dependencies.len(),
            "compiled source tree"
        );

        Ok(CompileOutput {
            atoms,
            packages: manifest.dependencies.into_keys().collect(),
        })
    }
}
