//! Bucket-qualified storage locations.

use std::fmt;

use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};

/// An object address: bucket name plus key within the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl StorageLocation {
    /// Create a new location.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// The key as an object store path.
    #[must_use]
    pub fn object_path(&self) -> ObjectPath {
        ObjectPath::from(self.key.as_str())
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serialises_as_bucket_and_key() {
        let location = StorageLocation::new("artifacts", "ttl-7d/fragments/abc");
        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"bucket": "artifacts", "key": "ttl-7d/fragments/abc"})
        );
        assert_eq!(location.to_string(), "artifacts/ttl-7d/fragments/abc");
        assert_eq!(location.object_path().as_ref(), "ttl-7d/fragments/abc");
    }
}
