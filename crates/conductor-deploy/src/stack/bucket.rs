//! Stack descriptions kept in object storage.

use async_trait::async_trait;
use conductor_pool::{Buckets, PoolError, StorageLocation};
use tracing::debug;

use super::{Stack, StackBackend};
use crate::error::{DeployError, DeployResult};

/// Stores each stack as JSON at `stacks/<name>.json`.
///
/// Applying a stack means recording it; there is no provider behind it.
/// This keeps deploys idempotent across runs when no provider API is
/// available.
#[derive(Debug, Clone)]
pub struct ObjectStoreStackBackend {
    buckets: Buckets,
    bucket: String,
}

impl ObjectStoreStackBackend {
    /// Create a backend writing to `bucket`.
    pub fn new(buckets: Buckets, bucket: impl Into<String>) -> DeployResult<Self> {
        let bucket = bucket.into();
        if !buckets.contains(&bucket) {
            return Err(DeployError::configuration(format!(
                "no storage configured for stack bucket {bucket}"
            )));
        }
        Ok(Self { buckets, bucket })
    }

    /// Location of the stack named `name`.
    #[must_use]
    pub fn location(&self, name: &str) -> StorageLocation {
        StorageLocation::new(&self.bucket, format!("stacks/{name}.json"))
    }
}

#[async_trait]
impl StackBackend for ObjectStoreStackBackend {
    async fn current(&self, name: &str) -> DeployResult<Option<Stack>> {
        let location = self.location(name);
        match self.buckets.read(&location).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(PoolError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply(&self, stack: &Stack) -> DeployResult<()> {
        let location = self.location(&stack.name);
        let body = serde_json::to_vec_pretty(stack)?;
        self.buckets
            .write(&location, body.into())
            .await
            .map_err(|e| DeployError::stack_apply(&stack.name, e.to_string()))?;
        debug!(location = %location, "stack recorded");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use object_store::memory::InMemory;
    use serde_json::Map;

    use super::*;
    use crate::stack::{ApplyOutcome, StackPusher, StackResource};

    #[tokio::test]
    async fn stack_survives_between_pushers() {
        let buckets = Buckets::new().with_bucket("state", Arc::new(InMemory::new()));
        let stack = Stack {
            name: "shop-prod".to_owned(),
            resources: BTreeMap::from([(
                "orders".to_owned(),
                StackResource::new("orders", "table", Map::new()),
            )]),
        };

        let first = StackPusher::new(Arc::new(
            ObjectStoreStackBackend::new(buckets.clone(), "state").unwrap(),
        ));
        assert_eq!(first.deploy(&stack).await.unwrap(), ApplyOutcome::Applied);

        let backend = ObjectStoreStackBackend::new(buckets.clone(), "state").unwrap();
        assert!(buckets
            .size(&backend.location("shop-prod"))
            .await
            .unwrap()
            .is_some());
        let second = StackPusher::new(Arc::new(backend));
        assert_eq!(second.deploy(&stack).await.unwrap(), ApplyOutcome::NoChange);
    }

    #[test]
    fn unknown_bucket_is_a_configuration_error() {
        assert!(matches!(
            ObjectStoreStackBackend::new(Buckets::new(), "state"),
            Err(DeployError::Configuration(_))
        ));
    }
}
