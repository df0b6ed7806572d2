//! Shared fixtures for deploy integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use conductor_build::{
    DependencyResolver, GraphNode, InstallRoots, PackageFilter, Packager, SourceTreeCompiler,
    StaticGraphSource,
};
use conductor_deploy::{
    ArtifactPusher, DeploySpec, MemoryStackBackend, Orchestrator, RecordingCodeUpdater, Stack,
    StackBackend, StackPusher,
};
use conductor_pool::{BlobPool, Buckets, StorageLocation, DEFAULT_PREFIX};
use conductor_teleport::{LocalTeleporter, TeleportConfig};
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult,
};
use tempfile::TempDir;

pub const BUCKET: &str = "artifacts";

/// A project with three units:
///
/// - `api`: code importing `uuid`, wired to `orders`;
/// - `worker`: code importing `ms`;
/// - `orders`: a table with no code.
pub struct DeployProject {
    pub dir: TempDir,
    pub buckets: Buckets,
}

/// An orchestrator with handles on its in-memory collaborators.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub stacks: Arc<MemoryStackBackend>,
    pub updates: Arc<RecordingCodeUpdater>,
}

impl Harness {
    pub async fn deployed_stack(&self, name: &str) -> Option<Stack> {
        self.stacks.current(name).await.unwrap()
    }
}

/// In-memory store that records every object whose content was fetched.
/// Head requests are not recorded.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemory,
    fetched: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl std::fmt::Display for RecordingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecordingStore({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        if !options.head {
            self.fetched.lock().unwrap().push(location.to_string());
        }
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

impl DeployProject {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemory::new()))
    }

    /// A project whose artifact bucket is backed by `store`.
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
            buckets: Buckets::new().with_bucket(BUCKET, store),
        };
        project.install("uuid", "9.0.0");
        project.install("ms", "2.0.0");
        project.unit("api", "exports.handler = () => require('uuid').v4();", &["uuid"]);
        project.unit("worker", "exports.handler = () => require('ms')('1d');", &["ms"]);
        project.write(
            "deploy.json",
            &serde_json::to_string_pretty(&serde_json::json!({
                "project": "shop",
                "units": [
                    {"name": "api", "root_dir": "units/api", "entry_point": "index.js",
                     "resource": {"type": "function", "properties": {"memory": 256}}},
                    {"name": "worker", "root_dir": "units/worker", "entry_point": "index.js",
                     "resource": {"type": "function"}},
                    {"name": "orders", "resource": {"type": "table", "properties": {"key": "id"}}}
                ],
                "targets": [{"name": "prod", "region": "eu-west-1", "environment": "prod"}],
                "wiring": [
                    {"consumer": "api", "logical_name": "orders", "supplier": "orders",
                     "policy": [{"actions": ["table:Get", "table:Put"]}]}
                ]
            }))
            .unwrap(),
        );
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn install(&self, name: &str, version: &str) {
        self.write(
            &format!("node_modules/{name}/package.json"),
            &format!(r#"{{"name":"{name}","version":"{version}"}}"#),
        );
        self.write(
            &format!("node_modules/{name}/index.js"),
            &format!("// {name}@{version}"),
        );
    }

    pub fn unit(&self, name: &str, handler: &str, dependencies: &[&str]) {
        let deps: serde_json::Map<String, serde_json::Value> = dependencies
            .iter()
            .map(|d| ((*d).to_owned(), serde_json::Value::from("*")))
            .collect();
        self.write(&format!("units/{name}/index.js"), handler);
        self.write(
            &format!("units/{name}/package.json"),
            &serde_json::json!({ "name": name, "dependencies": deps }).to_string(),
        );
    }

    pub fn spec(&self) -> DeploySpec {
        DeploySpec::load(self.root().join("deploy.json")).unwrap()
    }

    pub async fn packager(&self) -> Packager {
        let base = self.spec().base_dir;
        let graph = StaticGraphSource::new().with_graph(
            &base,
            GraphNode::expanded(
                "1.0.0",
                [
                    ("ms", GraphNode::sparse("2.0.0")),
                    ("uuid", GraphNode::sparse("9.0.0")),
                ],
            ),
        );
        let mut resolver =
            DependencyResolver::new(InstallRoots::new([base]).unwrap(), PackageFilter::all());
        resolver.prepopulate(&graph).await.unwrap();
        Packager::new(Arc::new(SourceTreeCompiler::default()), resolver)
    }

    pub fn pool(&self) -> BlobPool {
        BlobPool::from_buckets(&self.buckets, BUCKET, DEFAULT_PREFIX).unwrap()
    }

    pub async fn harness_with(
        &self,
        stacks: MemoryStackBackend,
        teleport: Option<TeleportConfig>,
    ) -> Harness {
        let mut pusher = ArtifactPusher::new(self.buckets.clone(), BUCKET).unwrap();
        if let Some(config) = teleport {
            pusher = pusher.with_teleport(
                self.pool(),
                Arc::new(LocalTeleporter::new(self.buckets.clone())),
                config,
            );
        }

        let stacks = Arc::new(stacks);
        let updates = Arc::new(RecordingCodeUpdater::new());
        let orchestrator = Orchestrator::new(
            self.packager().await,
            pusher,
            StackPusher::new(stacks.clone()),
            updates.clone(),
        );
        Harness {
            orchestrator,
            stacks,
            updates,
        }
    }

    pub async fn harness(&self) -> Harness {
        self.harness_with(MemoryStackBackend::new(), None).await
    }

    pub fn deployable(&self, unit: &str) -> StorageLocation {
        StorageLocation::new(BUCKET, format!("deployables/shop-prod-{unit}.zip"))
    }

    pub async fn read(&self, location: &StorageLocation) -> Option<Bytes> {
        match self.buckets.size(location).await.unwrap() {
            Some(_) => Some(self.buckets.read(location).await.unwrap()),
            None => None,
        }
    }
}
