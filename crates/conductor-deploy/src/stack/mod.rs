//! Infrastructure stacks and their idempotent application.
//!
//! A [`Stack`] is rebuilt from the deploy specification on every run (see
//! [`assemble`]) and handed to a [`StackPusher`], which compares it with the
//! stack currently deployed and only submits it when something differs.
//!
//! Backends:
//!
//! - [`MemoryStackBackend`]: in-process, for tests and dry runs.
//! - [`ObjectStoreStackBackend`]: stack descriptions kept as JSON objects at
//!   `stacks/<name>.json`.
//! - [`HttpStackBackend`]: a provider API that applies stacks asynchronously.

mod assemble;
mod bucket;
mod http;
mod memory;

pub use assemble::{assemble, Contribution};
pub use bucket::ObjectStoreStackBackend;
pub use http::HttpStackBackend;
pub use memory::MemoryStackBackend;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::error::DeployResult;

/// One resource of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResource {
    /// Name of the resource within the stack.
    pub logical_name: String,
    /// Provider resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Provider properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Resources that must exist before this one.
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl StackResource {
    /// Create a resource with no dependencies.
    pub fn new(
        logical_name: impl Into<String>,
        resource_type: impl Into<String>,
        properties: Map<String, Value>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            resource_type: resource_type.into(),
            properties,
            depends_on: BTreeSet::new(),
        }
    }
}

/// A complete infrastructure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name.
    pub name: String,
    /// Resources by logical name.
    pub resources: BTreeMap<String, StackResource>,
}

/// What applying a stack did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The deployed stack already matched.
    NoChange,
    /// The stack was submitted and applied.
    Applied,
}

/// Where stacks are deployed.
#[async_trait]
pub trait StackBackend: Send + Sync {
    /// The currently deployed stack named `name`, if any.
    async fn current(&self, name: &str) -> DeployResult<Option<Stack>>;

    /// Submit `stack` and wait until the provider finishes applying it.
    ///
    /// A rejected stack fails with [`crate::DeployError::StackApply`]
    /// carrying the provider's diagnostic.
    async fn apply(&self, stack: &Stack) -> DeployResult<()>;
}

/// Applies stacks idempotently.
#[derive(Clone)]
pub struct StackPusher {
    backend: Arc<dyn StackBackend>,
}

impl StackPusher {
    /// Create a pusher over `backend`.
    pub fn new(backend: Arc<dyn StackBackend>) -> Self {
        Self { backend }
    }

    /// The currently deployed stack, or `None` if it was never deployed.
    pub async fn peek(&self, name: &str) -> DeployResult<Option<Stack>> {
        self.backend.current(name).await
    }

    /// Deploy `stack` unless the deployed one is identical.
    #[instrument(skip(self, stack), fields(stack = %stack.name, resources = stack.resources.len()))]
    pub async fn deploy(&self, stack: &Stack) -> DeployResult<ApplyOutcome> {
        if self.peek(&stack.name).await?.as_ref() == Some(stack) {
            info!("stack unchanged");
            return Ok(ApplyOutcome::NoChange);
        }

        self.backend.apply(stack).await?;
        info!("stack applied");
        Ok(ApplyOutcome::Applied)
    }
}

impl std::fmt::Debug for StackPusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackPusher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    fn stack(memory: u64) -> Stack {
        let mut properties = Map::new();
        properties.insert("memory".to_owned(), memory.into());
        let resource = StackResource::new("api", "function", properties);
        Stack {
            name: "shop-prod".to_owned(),
            resources: BTreeMap::from([("api".to_owned(), resource)]),
        }
    }

    #[tokio::test]
    async fn identical_stack_is_not_resubmitted() {
        let backend = Arc::new(MemoryStackBackend::new());
        let pusher = StackPusher::new(backend.clone());

        assert!(pusher.peek("shop-prod").await.unwrap().is_none());
        assert_eq!(pusher.deploy(&stack(128)).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(pusher.deploy(&stack(128)).await.unwrap(), ApplyOutcome::NoChange);
        assert_eq!(pusher.deploy(&stack(256)).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(backend.apply_count(), 2);
        assert_eq!(pusher.peek("shop-prod").await.unwrap(), Some(stack(256)));
    }

    #[tokio::test]
    async fn rejection_surfaces_diagnostic() {
        let backend = Arc::new(MemoryStackBackend::failing("Resource limit exceeded: functions"));
        let pusher = StackPusher::new(backend);

        match pusher.deploy(&stack(128)).await.unwrap_err() {
            DeployError::StackApply { stack, diagnostic } => {
                assert_eq!(stack, "shop-prod");
                assert_eq!(diagnostic, "Resource limit exceeded: functions");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(pusher.peek("shop-prod").await.unwrap().is_none());
    }

    #[test]
    fn resource_wire_format() {
        let json = serde_json::to_value(stack(128).resources["api"].clone()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "logicalName": "api",
                "type": "function",
                "properties": {"memory": 128},
                "dependsOn": []
            })
        );
    }
}
