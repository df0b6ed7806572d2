//! Storage backend configuration.

use std::path::Path;
use std::sync::Arc;

use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Configuration for the object stores backing every bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type: "memory", "local" or "s3".
    pub storage_type: String,
    /// Root directory for local storage; each bucket is a subdirectory.
    pub path: String,
    /// S3 region.
    pub region: Option<String>,
    /// S3 endpoint (for S3-compatible stores).
    pub endpoint: Option<String>,
    /// S3 access key id. Falls back to the environment when unset.
    pub access_key_id: Option<String>,
    /// S3 secret access key.
    pub secret_access_key: Option<String>,
    /// Allow plain HTTP endpoints.
    pub allow_http: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: "local".to_owned(),
            path: ".conductor/storage".to_owned(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }
}

impl StorageConfig {
    /// In-memory storage, mostly for tests and dry runs.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            storage_type: "memory".to_owned(),
            ..Self::default()
        }
    }

    /// Local filesystem storage rooted at `path`.
    pub fn local(path: impl AsRef<Path>) -> Self {
        Self {
            storage_type: "local".to_owned(),
            path: path.as_ref().display().to_string(),
            ..Self::default()
        }
    }
}

/// Create the object store serving `bucket`.
pub fn create_object_store(
    config: &StorageConfig,
    bucket: &str,
) -> PoolResult<Arc<dyn ObjectStore>> {
    match config.storage_type.as_str() {
        "local" => {
            let root = Path::new(&config.path).join(bucket);
            std::fs::create_dir_all(&root).map_err(|e| {
                PoolError::Config(format!("failed to create {}: {e}", root.display()))
            })?;
            let store = object_store::local::LocalFileSystem::new_with_prefix(&root)
                .map_err(|e| PoolError::Config(format!("failed to create local store: {e}")))?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(object_store::memory::InMemory::new())),
        #[cfg(feature = "aws")]
        "s3" => {
            use object_store::aws::AmazonS3Builder;
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_allow_http(config.allow_http);

            if let Some(region) = &config.region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = &config.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(key_id) = &config.access_key_id {
                builder = builder.with_access_key_id(key_id);
            }
            if let Some(secret) = &config.secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }

            let store = builder
                .build()
                .map_err(|e| PoolError::Config(format!("failed to create S3 store: {e}")))?;
            Ok(Arc::new(store))
        }
        other => Err(PoolError::Config(format!("unsupported storage type: {other}"))),
    }
}
