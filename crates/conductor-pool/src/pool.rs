//! Content-addressed blob pool.
//!
//! Every blob lives at `<prefix>/fragments/<sha256-hex>`. Blobs are never
//! rewritten or deleted by the pool; the prefix is expected to sit under a
//! bucket lifecycle rule that expires old entries.

use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::buckets::Buckets;
use crate::error::{PoolError, PoolResult};
use crate::location::StorageLocation;

/// Prefix used when none is configured. Matches a seven day expiry rule.
pub const DEFAULT_PREFIX: &str = "ttl-7d";

/// Result of [`BlobPool::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Where the blob lives.
    pub location: StorageLocation,
    /// Whether this call physically wrote the blob. `false` on a cache hit.
    pub written: bool,
}

/// Immutable put/get store keyed by content hash.
#[derive(Debug, Clone)]
pub struct BlobPool {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl BlobPool {
    /// Create a pool over `store`, addressed as `bucket`, writing under `prefix`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_owned(),
        }
    }

    /// Create a pool over a bucket from the registry.
    pub fn from_buckets(buckets: &Buckets, bucket: &str, prefix: &str) -> PoolResult<Self> {
        Ok(Self::new(buckets.store(bucket)?, bucket, prefix))
    }

    /// The bucket this pool writes into.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key under which `content` is stored.
    #[must_use]
    pub fn key_for(&self, content: &[u8]) -> String {
        let digest = hex::encode(Sha256::digest(content));
        if self.prefix.is_empty() {
            format!("fragments/{digest}")
        } else {
            format!("{}/fragments/{digest}", self.prefix)
        }
    }

    /// Location of `key` in this pool's bucket.
    #[must_use]
    pub fn location(&self, key: impl Into<String>) -> StorageLocation {
        StorageLocation::new(&self.bucket, key)
    }

    /// Store `content`, writing it only if no blob with the same hash exists.
    ///
    /// A concurrent writer that wins the race for the same key is treated as
    /// a cache hit: both wrote identical bytes.
    #[instrument(skip(self, content), fields(bucket = %self.bucket, size = content.len()))]
    pub async fn put(&self, content: Bytes) -> PoolResult<PutOutcome> {
        let key = self.key_for(&content);
        let path = ObjectPath::from(key.as_str());
        let location = self.location(key.as_str());

        match self.store.head(&path).await {
            Ok(_) => {
                debug!(key = %key, "pool hit");
                return Ok(PutOutcome {
                    location,
                    written: false,
                });
            }
            Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(PoolError::transfer(key, e)),
        }

        match self
            .store
            .put_opts(&path, content.into(), PutMode::Create.into())
            .await
        {
            Ok(_) => {
                debug!(key = %key, "pool write");
                Ok(PutOutcome {
                    location,
                    written: true,
                })
            }
            Err(object_store::Error::AlreadyExists { .. }) => {
                debug!(key = %key, "pool hit after race");
                Ok(PutOutcome {
                    location,
                    written: false,
                })
            }
            Err(e) => Err(PoolError::transfer(key, e)),
        }
    }

    /// Fetch the blob stored at `key`.
    pub async fn get(&self, key: &str) -> PoolResult<Bytes> {
        let result = self
            .store
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| PoolError::from_store(key, e))?;
        result.bytes().await.map_err(|e| PoolError::from_store(key, e))
    }

    /// Whether a blob exists at `key`.
    pub async fn contains(&self, key: &str) -> PoolResult<bool> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(PoolError::transfer(key, e)),
        }
    }
}
