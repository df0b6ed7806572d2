//! Resolver and packager configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BuildResult;
use crate::graph::CommandGraphSource;
use crate::resolver::{DependencyResolver, DEFAULT_MODULES_DIR};
use crate::roots::{InstallRoots, PackageFilter};

/// The `[resolver]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Installation roots, in precedence order. Relative paths are resolved
    /// against the deploy specification's directory.
    pub install_roots: Vec<PathBuf>,
    /// Command printing the installed-package graph as JSON.
    pub list_command: Vec<String>,
    /// Package directory under each root.
    pub modules_dir: String,
    /// Packages provided by the runtime. `@scope/*` excludes a whole scope.
    pub external: Vec<String>,
    /// Extra directory names skipped when collecting unit sources.
    pub excludes: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            install_roots: vec![PathBuf::from(".")],
            list_command: ["npm", "ls", "--all", "--json"]
                .map(str::to_owned)
                .to_vec(),
            modules_dir: DEFAULT_MODULES_DIR.to_owned(),
            external: Vec::new(),
            excludes: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Build an empty resolver for these settings, resolving relative roots
    /// against `base`.
    pub fn resolver(&self, base: &Path) -> BuildResult<DependencyResolver> {
        let roots = InstallRoots::resolve(self.install_roots.iter().cloned(), base)?;
        Ok(
            DependencyResolver::new(roots, PackageFilter::excluding(self.external.iter().cloned()))
                .with_modules_dir(&self.modules_dir),
        )
    }

    /// The graph source running [`ResolverConfig::list_command`].
    pub fn graph_source(&self) -> BuildResult<CommandGraphSource> {
        CommandGraphSource::new(&self.list_command)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_resolver_section() {
        let config: ResolverConfig = toml::from_str(
            r#"
            install_roots = ["services", "/opt/layers/shared"]
            external = ["aws-sdk", "@aws-sdk/*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.modules_dir, "node_modules");
        assert_eq!(config.list_command[0], "npm");

        let resolver = config.resolver(Path::new("/work")).unwrap();
        let roots: Vec<_> = resolver.roots().iter().collect();
        assert_eq!(
            roots,
            vec![Path::new("/work/services"), Path::new("/opt/layers/shared")]
        );
    }
}
