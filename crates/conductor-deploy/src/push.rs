//! Pushing packaged units to their deployable location.
//!
//! Each deployable `deployables/<physical_name>.zip` has a sidecar object
//! `deployables/<physical_name>.zip.fingerprint` holding the content digest
//! of the unit it was built from. Change detection compares digests, so an
//! unchanged unit costs one small read and one head request. The archive
//! itself is never downloaded, and on the teleport path it is never built
//! locally either.

use std::sync::Arc;

use bytes::Bytes;
use conductor_archive::{Archive, Fingerprint, DEPLOYABLE_EXTENSION};
use conductor_build::PackagedUnit;
use conductor_pool::{BlobPool, Buckets, StorageLocation};
use conductor_teleport::{TeleportConfig, TeleportRequest, Teleporter};
use futures::future::try_join_all;
use tokio::task::spawn_blocking;
use tracing::{debug, info, instrument};

use crate::error::{DeployError, DeployResult};

/// Suffix of the object recording a deployable's content digest.
pub const DIGEST_SUFFIX: &str = "fingerprint";

/// Result of pushing one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// Where the deployable lives.
    pub location: StorageLocation,
    /// Whether new bytes were written. `false` means the deployable was
    /// already built from identical content.
    pub was_pushed: bool,
    /// Whether the archive was assembled remotely from pooled fragments.
    pub teleported: bool,
}

struct TeleportRoute {
    pool: BlobPool,
    teleporter: Arc<dyn Teleporter>,
    config: TeleportConfig,
}

/// Writes unit archives to `deployables/<physical_name>.zip`.
pub struct ArtifactPusher {
    buckets: Buckets,
    bucket: String,
    teleport: Option<TeleportRoute>,
}

impl ArtifactPusher {
    /// Create a pusher writing deployables to `bucket`.
    pub fn new(buckets: Buckets, bucket: impl Into<String>) -> DeployResult<Self> {
        let bucket = bucket.into();
        if !buckets.contains(&bucket) {
            return Err(DeployError::configuration(format!(
                "no storage configured for deployables bucket {bucket}"
            )));
        }
        Ok(Self {
            buckets,
            bucket,
            teleport: None,
        })
    }

    /// Teleport units that cross the thresholds in `config`.
    #[must_use]
    pub fn with_teleport(
        mut self,
        pool: BlobPool,
        teleporter: Arc<dyn Teleporter>,
        config: TeleportConfig,
    ) -> Self {
        self.teleport = Some(TeleportRoute {
            pool,
            teleporter,
            config,
        });
        self
    }

    /// Deployable location for the unit with physical name `physical_name`.
    #[must_use]
    pub fn location(&self, physical_name: &str) -> StorageLocation {
        StorageLocation::new(
            &self.bucket,
            format!("deployables/{physical_name}.{DEPLOYABLE_EXTENSION}"),
        )
    }

    /// Location of the digest sidecar for `deployable`.
    #[must_use]
    pub fn digest_location(deployable: &StorageLocation) -> StorageLocation {
        StorageLocation::new(
            &deployable.bucket,
            format!("{}.{DIGEST_SUFFIX}", deployable.key),
        )
    }

    /// Digest recorded for the deployable at `location`, if any.
    pub async fn stored_digest(
        &self,
        location: &StorageLocation,
    ) -> DeployResult<Option<Fingerprint>> {
        match self.buckets.read(&Self::digest_location(location)).await {
            Ok(bytes) => {
                let hex = std::str::from_utf8(&bytes)
                    .map(str::trim)
                    .unwrap_or_default();
                Ok((!hex.is_empty()).then(|| Fingerprint::from_hex(hex)))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the deployable at `location` was built from content other
    /// than `digest`, or is missing.
    pub async fn differs(
        &self,
        location: &StorageLocation,
        digest: &Fingerprint,
    ) -> DeployResult<bool> {
        if self.stored_digest(location).await?.as_ref() != Some(digest) {
            return Ok(true);
        }
        Ok(self.buckets.size(location).await?.is_none())
    }

    /// Push `unit` under `physical_name`.
    #[instrument(
        skip(self, unit),
        fields(unit = %unit.unit, fingerprint = %unit.fingerprint.short())
    )]
    pub async fn push(
        &self,
        physical_name: &str,
        unit: &PackagedUnit,
    ) -> DeployResult<PushOutcome> {
        let location = self.location(physical_name);
        let digest = unit.content_digest();

        if !self.differs(&location, &digest).await? {
            debug!(location = %location, "deployable unchanged");
            return Ok(PushOutcome {
                location,
                was_pushed: false,
                teleported: false,
            });
        }

        let (teleported, size) = match &self.teleport {
            Some(route) if route.config.applies_to(unit.fragments.len(), unit.content_size()) => {
                (true, self.teleport(route, unit, &location).await?)
            }
            _ => {
                let archive = unit.archive()?;
                let content = spawn_blocking(move || archive.to_zip()).await??;
                let size = content.len() as u64;
                self.buckets.write(&location, content).await?;
                (false, size)
            }
        };

        // Written last: a run interrupted before this point pushes again.
        self.buckets
            .write(
                &Self::digest_location(&location),
                Bytes::from(digest.as_str().to_owned()),
            )
            .await?;

        info!(location = %location, size, teleported, "deployable pushed");
        Ok(PushOutcome {
            location,
            was_pushed: true,
            teleported,
        })
    }

    async fn teleport(
        &self,
        route: &TeleportRoute,
        unit: &PackagedUnit,
        destination: &StorageLocation,
    ) -> DeployResult<u64> {
        let encoded = try_join_all(unit.fragments.iter().cloned().map(|fragment| async move {
            let blob =
                spawn_blocking(move || Archive::from_fragment(&fragment).to_bytes()).await??;
            Ok::<_, DeployError>(blob)
        }))
        .await?;

        let puts =
            try_join_all(encoded.into_iter().map(|blob: Bytes| route.pool.put(blob))).await?;
        let written = puts.iter().filter(|p| p.written).count();
        debug!(
            fragments = puts.len(),
            written,
            hits = puts.len() - written,
            "fragments pooled"
        );

        let request = TeleportRequest {
            fragments: puts.into_iter().map(|p| p.location).collect(),
            destination: destination.clone(),
        };
        let response = route.teleporter.teleport(&request).await?;
        debug!(
            merged_size = response.merged_size_bytes,
            fragments = response.fragment_count,
            "teleport finished"
        );
        Ok(response.merged_size_bytes)
    }
}

impl std::fmt::Debug for ArtifactPusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPusher")
            .field("bucket", &self.bucket)
            .field("teleport", &self.teleport.as_ref().map(|r| &r.config))
            .finish_non_exhaustive()
    }
}
