//! Content-addressed blob storage for Conductor.
//!
//! [`BlobPool`] stores immutable blobs keyed by their SHA-256 digest so that
//! unchanged fragments are uploaded once and reused across deploys.
//! [`Buckets`] resolves bucket-qualified [`StorageLocation`]s to object stores
//! for everything that is not content-addressed (deployables, stack state).

pub mod buckets;
pub mod config;
pub mod error;
pub mod location;
pub mod pool;

pub use buckets::Buckets;
pub use config::{create_object_store, StorageConfig};
pub use error::{PoolError, PoolResult};
pub use location::StorageLocation;
pub use pool::{BlobPool, PutOutcome, DEFAULT_PREFIX};
