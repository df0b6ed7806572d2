//! Clients that perform teleportation.

use std::time::Duration;

use async_trait::async_trait;
use conductor_pool::Buckets;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{TeleportError, TeleportResult};
use crate::merge::merge_fragments;
use crate::protocol::{InvocationResponse, TeleportRequest, TeleportResponse};

/// Merges pooled fragments into a final archive somewhere.
#[async_trait]
pub trait Teleporter: Send + Sync {
    /// Perform the merge described by `request`.
    async fn teleport(&self, request: &TeleportRequest) -> TeleportResult<TeleportResponse>;
}

/// Merges in-process against a bucket registry.
#[derive(Debug, Clone)]
pub struct LocalTeleporter {
    buckets: Buckets,
}

impl LocalTeleporter {
    /// Create a teleporter over `buckets`.
    #[must_use]
    pub fn new(buckets: Buckets) -> Self {
        Self { buckets }
    }
}

#[async_trait]
impl Teleporter for LocalTeleporter {
    async fn teleport(&self, request: &TeleportRequest) -> TeleportResult<TeleportResponse> {
        merge_fragments(&self.buckets, request).await
    }
}

/// Invokes a remote `conductor-teleport` service.
#[derive(Debug, Clone)]
pub struct HttpTeleporter {
    client: Client,
    base_url: String,
}

impl HttpTeleporter {
    /// Create a client for the service at `url`. Requests carry no timeout
    /// unless one is given.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> TeleportResult<Self> {
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
impl Teleporter for HttpTeleporter {
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    async fn teleport(&self, request: &TeleportRequest) -> TeleportResult<TeleportResponse> {
        let url = format!("{}/teleport", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = %status, "remote merge answered");

        match serde_json::from_str::<InvocationResponse>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) => Err(TeleportError::Remote {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}
