//! Pointing deployed functions at freshly pushed code.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{response_body, DeployError, DeployResult};

/// A code-update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeUpdate {
    /// Physical name of the function.
    pub function_identifier: String,
    /// Bucket holding the deployable.
    pub code_location_bucket: String,
    /// Key of the deployable.
    pub code_location_key: String,
}

/// Issues code-update calls.
#[async_trait]
pub trait CodeUpdater: Send + Sync {
    /// Point `update.function_identifier` at the given code location.
    async fn update(&self, update: &CodeUpdate) -> DeployResult<()>;
}

/// Logs each update without calling anything.
#[derive(Debug, Clone, Default)]
pub struct LogCodeUpdater;

#[async_trait]
impl CodeUpdater for LogCodeUpdater {
    async fn update(&self, update: &CodeUpdate) -> DeployResult<()> {
        info!(
            function = %update.function_identifier,
            bucket = %update.code_location_bucket,
            key = %update.code_location_key,
            "code update"
        );
        Ok(())
    }
}

/// POSTs each update to `{base}/code-updates`.
#[derive(Debug, Clone)]
pub struct HttpCodeUpdater {
    client: Client,
    base_url: String,
}

impl HttpCodeUpdater {
    /// Create a client for the endpoint at `url`.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> DeployResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            base_url: url.into().trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl CodeUpdater for HttpCodeUpdater {
    #[instrument(skip(self, update), fields(function = %update.function_identifier))]
    async fn update(&self, update: &CodeUpdate) -> DeployResult<()> {
        let url = format!("{}/code-updates", self.base_url);
        let response = self.client.post(&url).json(update).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response_body(response).await;
            return Err(DeployError::CodeUpdate {
                function: update.function_identifier.clone(),
                message: format!("{status}: {body}"),
            });
        }
        Ok(())
    }
}

/// Records updates in memory for testing.
#[derive(Debug, Default)]
pub struct RecordingCodeUpdater {
    calls: Mutex<Vec<CodeUpdate>>,
}

impl RecordingCodeUpdater {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates received so far, in call order.
    pub fn calls(&self) -> Vec<CodeUpdate> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Forget recorded updates.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

#[async_trait]
impl CodeUpdater for RecordingCodeUpdater {
    async fn update(&self, update: &CodeUpdate) -> DeployResult<()> {
        self.calls
            .lock()
            .map_err(|_| DeployError::internal("lock poisoned"))?
            .push(update.clone());
        Ok(())
    }
}
