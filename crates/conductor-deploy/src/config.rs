//! Deploy configuration.
//!
//! Loaded in the following order (later sources override earlier):
//! 1. Default values
//! 2. `conductor.toml` in the current directory, or an explicit file
//! 3. Environment variables with the `CONDUCTOR_` prefix, nested with `__`
//!    (`CONDUCTOR_TELEPORT__ENABLED=true`)
//!
//! ```toml
//! [storage]
//! storage_type = "s3"
//! region = "eu-west-1"
//!
//! [deployables]
//! bucket = "shop-artifacts"
//!
//! [teleport]
//! enabled = true
//! mode = "http"
//! endpoint = "http://teleport.internal:8790"
//!
//! [stack]
//! backend = "http"
//! endpoint = "http://provider.internal"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use conductor_build::{Packager, ResolverConfig, SourceTreeCompiler};
use conductor_pool::{BlobPool, Buckets, StorageConfig, DEFAULT_PREFIX};
use conductor_teleport::TeleportConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use tracing::debug;

use crate::codeupdate::{CodeUpdater, HttpCodeUpdater, LogCodeUpdater};
use crate::error::{DeployError, DeployResult};
use crate::push::ArtifactPusher;
use crate::stack::{HttpStackBackend, MemoryStackBackend, ObjectStoreStackBackend, StackBackend};

/// Bucket used for everything unless configured otherwise.
pub const DEFAULT_BUCKET: &str = "conductor-artifacts";

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_owned()
}

/// Complete deploy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeployConfig {
    /// Object storage backing every bucket.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Blob pool settings.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Deployable artifact settings.
    #[serde(default)]
    pub deployables: DeployablesConfig,

    /// Teleportation settings.
    #[serde(default)]
    pub teleport: TeleportConfig,

    /// Dependency resolution settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Stack backend settings.
    #[serde(default)]
    pub stack: StackConfig,

    /// Code-update settings.
    #[serde(default)]
    pub code: CodeConfig,
}

/// The `[pool]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Bucket holding pooled fragments.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Expiry-scoped key prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            prefix: default_prefix(),
        }
    }
}

/// The `[deployables]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployablesConfig {
    /// Bucket holding final zip archives.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for DeployablesConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
        }
    }
}

/// Stack backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackBackendKind {
    /// Kept in process memory; every run starts empty.
    Memory,
    /// JSON descriptions in object storage.
    #[default]
    ObjectStore,
    /// Remote provider API.
    Http,
}

/// The `[stack]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StackConfig {
    /// Which backend applies stacks.
    #[serde(default)]
    pub backend: StackBackendKind,
    /// Bucket for the `object_store` backend. Defaults to the deployables
    /// bucket.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Provider API base URL for the `http` backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Delay between operation status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-request timeout, in seconds. Unset means no client-side limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            backend: StackBackendKind::default(),
            bucket: None,
            endpoint: None,
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: None,
        }
    }
}

/// Code updater selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeUpdaterKind {
    /// Log the calls only.
    #[default]
    Log,
    /// POST them to an endpoint.
    Http,
}

/// The `[code]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeConfig {
    /// Which updater issues code-update calls.
    #[serde(default)]
    pub updater: CodeUpdaterKind,
    /// Endpoint for the `http` updater.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Per-request timeout, in seconds. Unset means no client-side limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            updater: CodeUpdaterKind::default(),
            endpoint: None,
            timeout_secs: None,
        }
    }
}

impl DeployConfig {
    /// Load configuration from `path`, or from `conductor.toml` when `None`.
    pub fn load(path: Option<&Path>) -> DeployResult<Self> {
        let file = path.unwrap_or_else(|| Path::new("conductor.toml"));
        if path.is_some() && !file.is_file() {
            return Err(DeployError::configuration(format!(
                "config file {} does not exist",
                file.display()
            )));
        }

        Ok(Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .extract()?)
    }

    fn stack_bucket(&self) -> &str {
        self.stack
            .bucket
            .as_deref()
            .unwrap_or(&self.deployables.bucket)
    }

    /// Build the bucket registry for every configured bucket.
    pub fn buckets(&self) -> DeployResult<Buckets> {
        let mut names = vec![self.pool.bucket.as_str(), self.deployables.bucket.as_str()];
        if self.stack.backend == StackBackendKind::ObjectStore {
            names.push(self.stack_bucket());
        }
        Ok(Buckets::from_config(&self.storage, names)?)
    }

    /// Build the artifact pusher, with teleportation when enabled.
    pub fn artifact_pusher(&self, buckets: &Buckets) -> DeployResult<ArtifactPusher> {
        let pusher = ArtifactPusher::new(buckets.clone(), &self.deployables.bucket)?;
        if !self.teleport.enabled {
            return Ok(pusher);
        }

        let pool = BlobPool::from_buckets(buckets, &self.pool.bucket, &self.pool.prefix)?;
        let teleporter = self.teleport.teleporter(buckets)?;
        debug!(mode = ?self.teleport.mode, "teleportation enabled");
        Ok(pusher.with_teleport(pool, teleporter, self.teleport.clone()))
    }

    /// Build the configured stack backend.
    pub fn stack_backend(&self, buckets: &Buckets) -> DeployResult<Arc<dyn StackBackend>> {
        match self.stack.backend {
            StackBackendKind::Memory => Ok(Arc::new(MemoryStackBackend::new())),
            StackBackendKind::ObjectStore => Ok(Arc::new(ObjectStoreStackBackend::new(
                buckets.clone(),
                self.stack_bucket(),
            )?)),
            StackBackendKind::Http => {
                let endpoint = self.stack.endpoint.as_deref().ok_or_else(|| {
                    DeployError::configuration("stack backend is http but no endpoint is set")
                })?;
                Ok(Arc::new(HttpStackBackend::new(
                    endpoint,
                    self.stack.timeout_secs.map(Duration::from_secs),
                    Duration::from_millis(self.stack.poll_interval_ms),
                )?))
            }
        }
    }

    /// Build the configured code updater.
    pub fn code_updater(&self) -> DeployResult<Arc<dyn CodeUpdater>> {
        match self.code.updater {
            CodeUpdaterKind::Log => Ok(Arc::new(LogCodeUpdater)),
            CodeUpdaterKind::Http => {
                let endpoint = self.code.endpoint.as_deref().ok_or_else(|| {
                    DeployError::configuration("code updater is http but no endpoint is set")
                })?;
                Ok(Arc::new(HttpCodeUpdater::new(
                    endpoint,
                    self.code.timeout_secs.map(Duration::from_secs),
                )?))
            }
        }
    }

    /// Build a packager for a project rooted at `base_dir`, querying the
    /// dependency graph of every installation root once.
    pub async fn packager(&self, base_dir: &Path) -> DeployResult<Packager> {
        let mut resolver = self.resolver.resolver(base_dir)?;
        let source = self.resolver.graph_source()?;
        resolver.prepopulate(&source).await?;
        let compiler = SourceTreeCompiler::new(self.resolver.excludes.clone());
        Ok(Packager::new(Arc::new(compiler), resolver))
    }
}
