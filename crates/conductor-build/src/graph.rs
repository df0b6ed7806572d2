//! Installed-package graphs.
//!
//! A graph is the JSON tree printed by `npm ls --all --json`:
//!
//! ```json
//! {"name": "app", "version": "1.0.0", "dependencies": {
//!     "express": {"version": "4.18.2", "dependencies": {"debug": {"version": "2.6.9"}}}
//! }}
//! ```
//!
//! A node without a `dependencies` key is sparse: the package manager either
//! printed it deduplicated or it has no dependencies of its own.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::{BuildError, BuildResult};

/// One node of an installed-package graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Package name. Only present on the top-level node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Installed version. Absent for missing packages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Nested dependencies, when expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, GraphNode>>,
}

impl GraphNode {
    /// A sparse node: version only.
    pub fn sparse(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// An expanded node with the given children.
    pub fn expanded<I, S>(version: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = (S, GraphNode)>,
        S: Into<String>,
    {
        Self {
            name: None,
            version: Some(version.into()),
            dependencies: Some(children.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Whether the node carries nested dependency information.
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.dependencies.is_some()
    }
}

/// Produces the installed-package graph of an installation root.
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Read the graph rooted at `root`.
    async fn graph(&self, root: &Path) -> BuildResult<GraphNode>;
}

/// Runs the package manager's listing command inside each root.
#[derive(Debug, Clone)]
pub struct CommandGraphSource {
    program: String,
    args: Vec<String>,
}

impl CommandGraphSource {
    /// Use `command[0]` as the program and the rest as arguments.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Internal`] if `command` is empty.
    pub fn new(command: &[String]) -> BuildResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BuildError::Internal("empty dependency listing command".to_owned()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Default for CommandGraphSource {
    fn default() -> Self {
        Self {
            program: "npm".to_owned(),
            args: vec!["ls".to_owned(), "--all".to_owned(), "--json".to_owned()],
        }
    }
}

#[async_trait]
impl GraphSource for CommandGraphSource {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn graph(&self, root: &Path) -> BuildResult<GraphNode> {
        let graph_error = |message: String| BuildError::DependencyGraph {
            root: root.to_owned(),
            message,
        };

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| graph_error(format!("failed to spawn {}: {e}", self.program)))?;

        // npm exits non-zero for extraneous or invalid packages but still
        // prints the full tree.
        let parsed = serde_json::from_slice::<GraphNode>(&output.stdout);
        match (output.status.success(), parsed) {
            (true, Ok(graph)) => {
                debug!(root = %root.display(), "read dependency graph");
                Ok(graph)
            }
            (false, Ok(graph)) => {
                warn!(
                    root = %root.display(),
                    exit_code = output.status.code().unwrap_or(-1),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "dependency listing reported problems"
                );
                Ok(graph)
            }
            (_, Err(e)) => Err(graph_error(format!(
                "unparseable output ({e}); stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

/// Serves fixed graphs keyed by root. Roots without a graph are empty.
#[derive(Debug, Clone, Default)]
pub struct StaticGraphSource {
    graphs: HashMap<PathBuf, GraphNode>,
}

impl StaticGraphSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the graph for `root`.
    #[must_use]
    pub fn with_graph(mut self, root: impl Into<PathBuf>, graph: GraphNode) -> Self {
        self.graphs.insert(root.into(), graph);
        self
    }
}

#[async_trait]
impl GraphSource for StaticGraphSource {
    async fn graph(&self, root: &Path) -> BuildResult<GraphNode> {
        Ok(self.graphs.get(root).cloned().unwrap_or_default())
    }
}
