//! Stack backend for a remote provider API.
//!
//! ```text
//! GET  {base}/stacks/{name}       200 Stack | 404
//! PUT  {base}/stacks/{name}       202 {"operationId": "..."}
//! GET  {base}/operations/{id}     200 {"status": "in_progress|succeeded|failed", "diagnostic": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{Stack, StackBackend};
use crate::error::{response_body, DeployError, DeployResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStarted {
    operation_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Deserialize)]
struct OperationStatus {
    status: OperationState,
    #[serde(default)]
    diagnostic: Option<String>,
}

/// Applies stacks through a provider API, polling each operation until it
/// reaches a terminal state.
#[derive(Debug, Clone)]
pub struct HttpStackBackend {
    client: Client,
    base_url: String,
    poll_interval: Duration,
}

impl HttpStackBackend {
    /// Create a client for the provider at `url`. Requests carry no timeout
    /// unless one is given.
    pub fn new(
        url: impl Into<String>,
        timeout: Option<Duration>,
        poll_interval: Duration,
    ) -> DeployResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
            poll_interval,
        })
    }

    async fn wait(&self, stack: &str, operation: &str) -> DeployResult<()> {
        let url = format!("{}/operations/{operation}", self.base_url);
        loop {
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response_body(response).await;
                return Err(DeployError::stack_apply(
                    stack,
                    format!("operation {operation} status query failed ({status}): {body}"),
                ));
            }

            let current: OperationStatus = response.json().await?;
            debug!(operation, status = ?current.status, "stack operation polled");
            match current.status {
                OperationState::Succeeded => return Ok(()),
                OperationState::Failed => {
                    return Err(DeployError::stack_apply(
                        stack,
                        current
                            .diagnostic
                            .unwrap_or_else(|| format!("operation {operation} failed")),
                    ));
                }
                OperationState::InProgress => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

#[async_trait]
impl StackBackend for HttpStackBackend {
    async fn current(&self, name: &str) -> DeployResult<Option<Stack>> {
        let url = format!("{}/stacks/{name}", self.base_url);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => {
                let body = response_body(response).await;
                Err(DeployError::stack_apply(
                    name,
                    format!("cannot read deployed stack ({status}): {body}"),
                ))
            }
        }
    }

    #[instrument(skip(self, stack), fields(stack = %stack.name))]
    async fn apply(&self, stack: &Stack) -> DeployResult<()> {
        let url = format!("{}/stacks/{}", self.base_url, stack.name);
        let response = self.client.put(&url).json(stack).send().await?;

        if !response.status().is_success() {
            let body = response_body(response).await;
            return Err(DeployError::stack_apply(&stack.name, body));
        }

        let started: OperationStarted = response.json().await?;
        debug!(operation = %started.operation_id, "stack submitted");
        self.wait(&stack.name, &started.operation_id).await
    }
}
