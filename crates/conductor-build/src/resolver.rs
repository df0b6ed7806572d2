//! Dependency resolution.
//!
//! The resolver reads the installed-package graph of every installation root
//! once, keeps one [`DependencyRecord`] per package name, then walks that
//! record graph from each package a unit imports to find everything that has
//! to be bundled with it.
//!
//! Record precedence when a name appears more than once:
//!
//! 1. an expanded record (one listing nested dependencies) beats a sparse one;
//! 2. between two expanded records the greater semver version wins;
//! 3. otherwise the record seen first, in [`InstallRoots`] order, stays.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{BuildError, BuildResult};
use crate::graph::{GraphNode, GraphSource};
use crate::roots::{owning_package, InstallRoots, PackageFilter};

/// Directory under each root where packages are installed.
pub const DEFAULT_MODULES_DIR: &str = "node_modules";

/// What one installation root says about a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Root the package is installed under.
    pub install_root: PathBuf,
    /// Direct dependencies: name to installed version.
    pub declared_dependencies: BTreeMap<String, String>,
    /// Installed version.
    pub version: String,
    /// Whether the graph expanded this package's dependencies.
    pub expanded: bool,
}

/// One package that must be bundled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUsage {
    /// Package name.
    pub package_name: String,
    /// Installed version.
    pub version: String,
    /// Directory holding the installed package.
    pub install_dir: PathBuf,
}

fn parse_version(package: &str, version: &str) -> BuildResult<Version> {
    Version::parse(version).map_err(|_| BuildError::InvalidVersion {
        package: package.to_owned(),
        version: version.to_owned(),
    })
}

/// Usages recorded across one or more entry points.
#[derive(Debug, Clone, Default)]
pub struct UsageSet {
    usages: Vec<PackageUsage>,
}

impl UsageSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a usage. Duplicates are resolved by [`UsageSet::compute`].
    pub fn record(&mut self, usage: PackageUsage) {
        self.usages.push(usage);
    }

    /// Number of recorded usages, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.usages.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    /// Collapse to one usage per package, keeping the greatest version.
    ///
    /// On equal versions the usage recorded first is kept.
    pub fn compute(&self) -> BuildResult<BTreeMap<String, PackageUsage>> {
        let mut best: BTreeMap<String, (Version, &PackageUsage)> = BTreeMap::new();
        for usage in &self.usages {
            let version = parse_version(&usage.package_name, &usage.version)?;
            match best.get(&usage.package_name) {
                Some((current, _)) if *current >= version => {}
                _ => {
                    best.insert(usage.package_name.clone(), (version, usage));
                }
            }
        }
        Ok(best
            .into_iter()
            .map(|(name, (_, usage))| (name, usage.clone()))
            .collect())
    }
}

/// Resolves the bundled dependency closure of a unit.
///
/// Records are shared between [`fork`](Self::fork)ed resolvers; usages are
/// per resolver.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    roots: InstallRoots,
    filter: PackageFilter,
    modules_dir: String,
    records: Arc<HashMap<String, DependencyRecord>>,
    usages: UsageSet,
}

impl DependencyResolver {
    /// Create a resolver with no records.
    #[must_use]
    pub fn new(roots: InstallRoots, filter: PackageFilter) -> Self {
        Self {
            roots,
            filter,
            modules_dir: DEFAULT_MODULES_DIR.to_owned(),
            records: Arc::new(HashMap::new()),
            usages: UsageSet::new(),
        }
    }

    /// Override the per-root package directory.
    #[must_use]
    pub fn with_modules_dir(mut self, modules_dir: impl Into<String>) -> Self {
        self.modules_dir = modules_dir.into();
        self
    }

    /// The configured roots.
    #[must_use]
    pub fn roots(&self) -> &InstallRoots {
        &self.roots
    }

    /// The record kept for `package`.
    #[must_use]
    pub fn record(&self, package: &str) -> Option<&DependencyRecord> {
        self.records.get(package)
    }

    /// A resolver sharing this one's records with no usages recorded.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            usages: UsageSet::new(),
            ..self.clone()
        }
    }

    /// Load the installed-package graph of every root.
    #[instrument(skip(self, source), fields(roots = self.roots.len()))]
    pub async fn prepopulate(&mut self, source: &dyn GraphSource) -> BuildResult<()> {
        let roots: Vec<PathBuf> = self.roots.iter().map(PathBuf::from).collect();
        for root in roots {
            let graph = source.graph(&root).await?;
            self.absorb(&root, &graph)?;
        }
        info!(packages = self.records.len(), "dependency records loaded");
        Ok(())
    }

    fn absorb(&mut self, root: &Path, graph: &GraphNode) -> BuildResult<()> {
        let Some(top) = &graph.dependencies else {
            return Ok(());
        };
        let mut stack: Vec<(&str, &GraphNode)> =
            top.iter().rev().map(|(n, node)| (n.as_str(), node)).collect();

        while let Some((name, node)) = stack.pop() {
            if let Some(children) = &node.dependencies {
                stack.extend(children.iter().rev().map(|(n, child)| (n.as_str(), child)));
            }
            let Some(version) = &node.version else {
                debug!(package = name, root = %root.display(), "skipping package without version");
                continue;
            };
            let declared_dependencies = node
                .dependencies
                .iter()
                .flatten()
                .map(|(n, child)| (n.clone(), child.version.clone().unwrap_or_default()))
                .collect();
            self.offer(
                name,
                DependencyRecord {
                    install_root: root.to_owned(),
                    declared_dependencies,
                    version: version.clone(),
                    expanded: node.is_expanded(),
                },
            )?;
        }
        Ok(())
    }

    /// Store `record` for `package` if it takes precedence over the current one.
    ///
    /// Returns whether the record was stored.
    pub fn offer(&mut self, package: &str, record: DependencyRecord) -> BuildResult<bool> {
        let replace = match self.records.get(package) {
            None => true,
            Some(current) => self.supersedes(package, &record, current)?,
        };
        if replace {
            Arc::make_mut(&mut self.records).insert(package.to_owned(), record);
        }
        Ok(replace)
    }

    fn supersedes(
        &self,
        package: &str,
        candidate: &DependencyRecord,
        current: &DependencyRecord,
    ) -> BuildResult<bool> {
        match (candidate.expanded, current.expanded) {
            (true, false) => Ok(true),
            (false, _) => Ok(false),
            (true, true) => {
                let ordering = parse_version(package, &candidate.version)?
                    .cmp(&parse_version(package, &current.version)?);
                Ok(match ordering {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        self.roots.rank(&candidate.install_root)
                            < self.roots.rank(&current.install_root)
                    }
                })
            }
        }
    }

    /// Record `entry` and every bundled package it transitively depends on.
    ///
    /// `entry` may be an import specifier such as `lodash/fp`.
    pub fn record_usage(&mut self, entry: &str) -> BuildResult<()> {
        let start = owning_package(entry).to_owned();
        let mut stack: Vec<(String, Option<PathBuf>)> = vec![(start, None)];
        let mut visited: HashSet<String> = HashSet::new();

        while let Some((package, requested_from)) = stack.pop() {
            if !visited.insert(package.clone()) {
                continue;
            }
            if !self.filter.accepts(&package) {
                debug!(package = %package, "provided by runtime");
                continue;
            }

            let record = self.records.get(&package).ok_or_else(|| {
                BuildError::UnresolvedPackage {
                    root: requested_from
                        .map_or_else(|| self.roots.to_string(), |r| r.display().to_string()),
                    package: package.clone(),
                }
            })?;

            let install_dir = record.install_root.join(&self.modules_dir).join(&package);
            if !install_dir.is_dir() {
                return Err(BuildError::MissingInstallDirectory {
                    package,
                    path: install_dir,
                });
            }

            stack.extend(
                record
                    .declared_dependencies
                    .keys()
                    .rev()
                    .filter(|name| !visited.contains(*name))
                    .map(|name| (name.clone(), Some(record.install_root.clone()))),
            );
            self.usages.record(PackageUsage {
                package_name: package,
                version: record.version.clone(),
                install_dir,
            });
        }
        Ok(())
    }

    /// The usages recorded so far.
    #[must_use]
    pub fn usages(&self) -> &UsageSet {
        &self.usages
    }

    /// Collapse recorded usages into one per package.
    pub fn compute(&self) -> BuildResult<BTreeMap<String, PackageUsage>> {
        self.usages.compute()
    }
}
