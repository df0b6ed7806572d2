//! Registry of named buckets.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use tracing::debug;

use crate::config::{create_object_store, StorageConfig};
use crate::error::{PoolError, PoolResult};
use crate::location::StorageLocation;

/// Maps bucket names to the object stores that serve them.
#[derive(Debug, Clone, Default)]
pub struct Buckets {
    stores: HashMap<String, Arc<dyn ObjectStore>>,
}

impl Buckets {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one store per bucket name.
    ///
    /// Repeated names share a single store.
    pub fn from_config<'a>(
        config: &StorageConfig,
        names: impl IntoIterator<Item = &'a str>,
    ) -> PoolResult<Self> {
        let mut buckets = Self::new();
        for name in names {
            if !buckets.contains(name) {
                buckets.insert(name, create_object_store(config, name)?);
            }
        }
        Ok(buckets)
    }

    /// Register `store` under `name`, replacing any previous store.
    pub fn insert(&mut self, name: impl Into<String>, store: Arc<dyn ObjectStore>) {
        self.stores.insert(name.into(), store);
    }

    /// Builder-style [`Buckets::insert`].
    #[must_use]
    pub fn with_bucket(mut self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.insert(name, store);
        self
    }

    /// Whether a store is registered for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    /// The store serving `name`.
    pub fn store(&self, name: &str) -> PoolResult<Arc<dyn ObjectStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| PoolError::UnknownBucket(name.to_owned()))
    }

    /// Read the object at `location`.
    pub async fn read(&self, location: &StorageLocation) -> PoolResult<Bytes> {
        let store = self.store(&location.bucket)?;
        let key = location.to_string();
        let result = store
            .get(&location.object_path())
            .await
            .map_err(|e| PoolError::from_store(&key, e))?;
        result
            .bytes()
            .await
            .map_err(|e| PoolError::from_store(&key, e))
    }

    /// Write `content` to `location`, overwriting any existing object.
    pub async fn write(&self, location: &StorageLocation, content: Bytes) -> PoolResult<()> {
        let store = self.store(&location.bucket)?;
        let size = content.len();
        store
            .put(&location.object_path(), content.into())
            .await
            .map_err(|e| PoolError::transfer(location.to_string(), e))?;
        debug!(location = %location, size, "object written");
        Ok(())
    }

    /// Size of the object at `location`, or `None` if it does not exist.
    pub async fn size(&self, location: &StorageLocation) -> PoolResult<Option<u64>> {
        let store = self.store(&location.bucket)?;
        match store.head(&location.object_path()).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(PoolError::transfer(location.to_string(), e)),
        }
    }
}
