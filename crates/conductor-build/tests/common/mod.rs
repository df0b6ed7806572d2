//! Shared fixtures for packaging integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use conductor_build::{
    DependencyResolver, GraphNode, InstallRoots, PackageFilter, Packager, SourceTreeCompiler,
    StaticGraphSource, UnitBuild,
};
use tempfile::TempDir;

/// A project directory with installed packages and unit sources.
pub struct TestProject {
    pub dir: TempDir,
}

impl TestProject {
    /// A project with `express -> debug -> ms` and `uuid` installed.
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
        };
        project.install("express", "4.18.2");
        project.install("debug", "2.6.9");
        project.install("ms", "2.0.0");
        project.install("uuid", "9.0.0");
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn install(&self, name: &str, version: &str) {
        let dir = self.root().join("node_modules").join(name);
        std::fs::create_dir_all(dir.join("lib")).unwrap();
        std::fs::write(
            dir.join("package.json"),
            format!(r#"{{"name":"{name}","version":"{version}"}}"#),
        )
        .unwrap();
        std::fs::write(dir.join("lib/index.js"), format!("// {name}@{version}")).unwrap();
    }

    /// Write a unit with one handler file and the given dependencies.
    pub fn unit(&self, name: &str, handler: &str, dependencies: &[&str]) -> PathBuf {
        let dir = self.root().join("units").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.js"), handler).unwrap();
        let deps: BTreeMap<&str, &str> = dependencies.iter().map(|d| (*d, "*")).collect();
        std::fs::write(
            dir.join("package.json"),
            serde_json::to_string(&serde_json::json!({ "name": name, "dependencies": deps }))
                .unwrap(),
        )
        .unwrap();
        dir
    }

    pub fn graph(&self) -> StaticGraphSource {
        StaticGraphSource::new().with_graph(
            self.root(),
            GraphNode::expanded(
                "1.0.0",
                [
                    (
                        "express",
                        GraphNode::expanded(
                            "4.18.2",
                            [(
                                "debug",
                                GraphNode::expanded("2.6.9", [("ms", GraphNode::sparse("2.0.0"))]),
                            )],
                        ),
                    ),
                    ("uuid", GraphNode::sparse("9.0.0")),
                ],
            ),
        )
    }

    pub async fn packager(&self) -> Packager {
        let roots = InstallRoots::new([self.root().to_owned()]).unwrap();
        let mut resolver = DependencyResolver::new(roots, PackageFilter::all());
        resolver.prepopulate(&self.graph()).await.unwrap();
        Packager::new(Arc::new(SourceTreeCompiler::default()), resolver)
    }

    pub fn build(&self, unit: &str, root_dir: PathBuf) -> UnitBuild {
        UnitBuild {
            unit: unit.to_owned(),
            root_dir,
            entry_point: "index.js".to_owned(),
            path_prefix: String::new(),
            package_context: self.root().display().to_string(),
            wiring: BTreeMap::new(),
        }
    }
}
