//! Shared fixtures for teleport integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use bytes::Bytes;
use conductor_archive::{Archive, Atom, Fragment};
use conductor_pool::{BlobPool, Buckets, StorageLocation, DEFAULT_PREFIX};
use conductor_teleport::TeleportRequest;
use object_store::memory::InMemory;

pub const POOL_BUCKET: &str = "pool";
pub const CODE_BUCKET: &str = "code";

/// In-memory pool and destination bucket.
pub struct TestStorage {
    pub buckets: Buckets,
    pub pool: BlobPool,
}

impl TestStorage {
    pub fn new() -> Self {
        let buckets = Buckets::new()
            .with_bucket(POOL_BUCKET, Arc::new(InMemory::new()))
            .with_bucket(CODE_BUCKET, Arc::new(InMemory::new()));
        let pool = BlobPool::from_buckets(&buckets, POOL_BUCKET, DEFAULT_PREFIX).unwrap();
        Self { buckets, pool }
    }

    /// Encode `files` as a fragment archive and put it in the pool.
    pub async fn pooled(&self, files: &[(&str, &str)]) -> StorageLocation {
        let mut fragment = Fragment::new();
        for (path, content) in files {
            fragment
                .add(Atom::new(*path, content.as_bytes().to_vec()).unwrap())
                .unwrap();
        }
        let bytes = Archive::from_fragment(&fragment).to_bytes().unwrap();
        self.pool.put(bytes).await.unwrap().location
    }

    pub fn request(&self, fragments: Vec<StorageLocation>, unit: &str) -> TeleportRequest {
        TeleportRequest {
            fragments,
            destination: StorageLocation::new(CODE_BUCKET, format!("deployables/{unit}.zip")),
        }
    }

    pub async fn read(&self, location: &StorageLocation) -> Bytes {
        self.buckets.read(location).await.unwrap()
    }
}
