//! Unit packaging.
//!
//! A packaged unit is a list of path-disjoint fragments:
//!
//! - `code`: the compiled sources under the unit's path prefix;
//! - `node_modules/<name>`: one per bundled package;
//! - `manifest`: `wiring.json` and `build-manifest.json`.
//!
//! The fingerprint covers the code and package fragments only. The manifest
//! atoms are derived from it (and from deploy-time wiring) so hashing them
//! would be circular.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use conductor_archive::{Archive, ArchiveResult, Atom, Fingerprint, Fragment};
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use tracing::{info, instrument};

use crate::compiler::Compiler;
use crate::error::{BuildError, BuildResult};
use crate::resolver::{DependencyResolver, PackageUsage};
use crate::tree::{collect_tree, TreeFilter};

/// File name of the wiring atom.
pub const WIRING_ATOM: &str = "wiring.json";

/// File name of the build manifest atom.
pub const MANIFEST_ATOM: &str = "build-manifest.json";

/// Where a wired supplier lives, as seen by the consumer at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiringTarget {
    /// Physical name of the supplier.
    pub physical_name: String,
    /// Region the supplier is deployed in.
    pub region: String,
}

/// Everything needed to package one unit.
#[derive(Debug, Clone)]
pub struct UnitBuild {
    /// Unit name.
    pub unit: String,
    /// Directory containing the unit's sources.
    pub root_dir: PathBuf,
    /// Entry point, relative to `root_dir`.
    pub entry_point: String,
    /// Prefix for every path in the archive. May be empty.
    pub path_prefix: String,
    /// Package context the unit is resolved in, for diagnostics.
    pub package_context: String,
    /// Logical dependency name to supplier location.
    pub wiring: BTreeMap<String, WiringTarget>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildManifest<'a> {
    unit: &'a str,
    fingerprint: &'a Fingerprint,
    dependencies: BTreeMap<&'a str, &'a str>,
}

/// A packaged unit, ready to be archived or teleported.
#[derive(Debug, Clone)]
pub struct PackagedUnit {
    /// Unit name.
    pub unit: String,
    /// Fingerprint of the code and bundled packages.
    pub fingerprint: Fingerprint,
    /// Path-disjoint fragments making up the bundle.
    pub fragments: Vec<Fragment>,
    /// Bundled packages by name.
    pub dependencies: BTreeMap<String, PackageUsage>,
    path_prefix: String,
}

impl PackagedUnit {
    /// Combine all fragments into one archive.
    pub fn archive(&self) -> ArchiveResult<Archive> {
        Archive::from_fragments(&self.fragments)
    }

    /// Total content bytes across fragments.
    #[must_use]
    pub fn content_size(&self) -> u64 {
        self.fragments.iter().map(Fragment::content_size).sum()
    }

    /// Paths of the atoms left out of the fingerprint.
    #[must_use]
    pub fn synthetic_paths(&self) -> [String; 2] {
        [
            join_prefix(&self.path_prefix, WIRING_ATOM),
            join_prefix(&self.path_prefix, MANIFEST_ATOM),
        ]
    }

    /// Digest over every atom, wiring and manifest included.
    ///
    /// Two units with the same digest encode to identical deployables, so
    /// this stands in for a byte comparison of the encoded archive.
    #[must_use]
    pub fn content_digest(&self) -> Fingerprint {
        Fingerprint::compute(self.fragments.iter().flat_map(Fragment::iter))
    }

    /// Recompute the fingerprint from the fragments.
    #[must_use]
    pub fn recompute_fingerprint(&self) -> Fingerprint {
        let [wiring, manifest] = self.synthetic_paths();
        Fingerprint::compute_excluding(
            self.fragments.iter().flat_map(Fragment::iter),
            &[wiring.as_str(), manifest.as_str()],
        )
    }
}

fn join_prefix(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        path.to_owned()
    } else {
        format!("{prefix}/{path}")
    }
}

fn json(value: &impl Serialize) -> BuildResult<Vec<u8>> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| BuildError::Internal(format!("failed to serialise manifest: {e}")))
}

/// Compiles units and bundles their resolved dependencies.
#[derive(Clone)]
pub struct Packager {
    compiler: Arc<dyn Compiler>,
    resolver: DependencyResolver,
}

impl Packager {
    /// Create a packager. `resolver` should already be prepopulated; each
    /// run works on a fork of it.
    pub fn new(compiler: Arc<dyn Compiler>, resolver: DependencyResolver) -> Self {
        Self { compiler, resolver }
    }

    /// Package one unit.
    ///
    /// # Errors
    ///
    /// Every failure is returned as [`BuildError::Packaging`] carrying the
    /// unit name, root directory and package context.
    #[instrument(skip(self, build), fields(unit = %build.unit))]
    pub async fn run(&self, build: &UnitBuild) -> BuildResult<PackagedUnit> {
        self.package(build)
            .await
            .map_err(|e| e.packaging(&build.unit, &build.root_dir, &build.package_context))
    }

    async fn package(&self, build: &UnitBuild) -> BuildResult<PackagedUnit> {
        let prefix = build.path_prefix.trim_matches('/').to_owned();
        let compiled = self
            .compiler
            .compile(&build.root_dir, &build.entry_point)
            .await?;

        let mut session = self.resolver.fork();
        for package in &compiled.packages {
            session.record_usage(package)?;
        }
        let dependencies = session.compute()?;

        let mut code = Fragment::named("code");
        for atom in compiled.atoms {
            code.add(atom.under(&prefix)?)?;
        }
        let mut fragments = vec![code];

        for usage in dependencies.values() {
            let name = format!("node_modules/{}", usage.package_name);
            let dir = usage.install_dir.clone();
            let target = join_prefix(&prefix, &name);
            let atoms = spawn_blocking(move || {
                collect_tree(&dir, &target, &TreeFilter::everything())
            })
            .await??;

            let mut fragment = Fragment::named(name);
            for atom in atoms {
                fragment.add(atom)?;
            }
            fragments.push(fragment);
        }

        let fingerprint = Fingerprint::compute(fragments.iter().flat_map(Fragment::iter));

        let manifest_body = BuildManifest {
            unit: &build.unit,
            fingerprint: &fingerprint,
            dependencies: dependencies
                .iter()
                .map(|(name, usage)| (name.as_str(), usage.version.as_str()))
                .collect(),
        };
        let mut manifest = Fragment::named("manifest");
        manifest.add(Atom::new(
            join_prefix(&prefix, WIRING_ATOM),
            json(&build.wiring)?,
        )?)?;
        manifest.add(Atom::new(
            join_prefix(&prefix, MANIFEST_ATOM),
            json(&manifest_body)?,
        )?)?;
        fragments.push(manifest);

        // Fragments are produced independently; make sure they still fit
        // together before handing them out.
        Archive::from_fragments(&fragments)?;

        info!(
            fingerprint = %fingerprint.short(),
            fragments = fragments.len(),
            packages = dependencies.len(),
            "unit packaged"
        );

        Ok(PackagedUnit {
            unit: build.unit.clone(),
            fingerprint,
            fragments,
            dependencies,
            path_prefix: prefix,
        })
    }
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
