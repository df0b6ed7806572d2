//! Fragment merging.

use bytes::Bytes;
use conductor_archive::Archive;
use conductor_pool::{Buckets, StorageLocation};
use futures::future::join_all;
use tokio::task::spawn_blocking;
use tracing::{info, instrument, warn};

use crate::error::{FragmentFailure, TeleportError, TeleportResult};
use crate::protocol::{TeleportRequest, TeleportResponse};

/// Fetch every fragment concurrently.
///
/// Either all fragments are returned, in request order, or the error lists
/// every fragment that could not be read.
pub async fn fetch_all(
    buckets: &Buckets,
    fragments: &[StorageLocation],
) -> TeleportResult<Vec<Bytes>> {
    let results = join_all(fragments.iter().map(|location| buckets.read(location))).await;

    let mut fetched = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (location, result) in fragments.iter().zip(results) {
        match result {
            Ok(bytes) => fetched.push(bytes),
            Err(e) => failed.push(FragmentFailure {
                location: location.clone(),
                message: e.to_string(),
            }),
        }
    }

    if failed.is_empty() {
        Ok(fetched)
    } else {
        warn!(failed = failed.len(), total = fragments.len(), "fragment fetch failed");
        Err(TeleportError::Transfer { failed })
    }
}

/// Decode fetched tar.zst fragments and merge them into a deterministic zip
/// deployable.
pub fn merge_bytes(fragments: &[StorageLocation], blobs: &[Bytes]) -> TeleportResult<Bytes> {
    let archives = fragments
        .iter()
        .zip(blobs)
        .map(|(location, blob)| {
            Archive::from_bytes(blob).map_err(|source| TeleportError::Decode {
                location: location.clone(),
                source,
            })
        })
        .collect::<TeleportResult<Vec<_>>>()?;

    Ok(Archive::merge(archives)?.to_zip()?)
}

/// Merge the requested fragments and write the result to the destination.
///
/// Nothing is written unless every fragment was fetched, decoded and merged
/// without conflict.
#[instrument(
    skip(buckets, request),
    fields(fragments = request.fragments.len(), destination = %request.destination)
)]
pub async fn merge_fragments(
    buckets: &Buckets,
    request: &TeleportRequest,
) -> TeleportResult<TeleportResponse> {
    if request.fragments.is_empty() {
        return Err(TeleportError::InvalidRequest("no fragments to merge".to_owned()));
    }
    if !buckets.contains(&request.destination.bucket) {
        return Err(TeleportError::InvalidRequest(format!(
            "unknown destination bucket {}",
            request.destination.bucket
        )));
    }

    let blobs = fetch_all(buckets, &request.fragments).await?;

    let fragments = request.fragments.clone();
    let merged = spawn_blocking(move || merge_bytes(&fragments, &blobs))
        .await
        .map_err(|e| TeleportError::Internal(format!("merge task failed: {e}")))??;

    let merged_size_bytes = merged.len() as u64;
    buckets.write(&request.destination, merged).await?;

    info!(size = merged_size_bytes, "fragments merged");

    Ok(TeleportResponse {
        destination: request.destination.clone(),
        fragment_count: request.fragments.len(),
        merged_size_bytes,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use conductor_archive::{Atom, Fragment};
    use object_store::memory::InMemory;

    use super::*;

    fn encoded(files: &[(&str, &'static str)]) -> Bytes {
        let mut fragment = Fragment::new();
        for (path, content) in files {
            fragment.add(Atom::new(*path, *content).unwrap()).unwrap();
        }
        Archive::from_fragment(&fragment).to_bytes().unwrap()
    }

    async fn seeded(blobs: &[(&str, Bytes)]) -> Buckets {
        let buckets = Buckets::new()
            .with_bucket("pool", Arc::new(InMemory::new()))
            .with_bucket("code", Arc::new(InMemory::new()));
        for (key, bytes) in blobs {
            buckets
                .write(&StorageLocation::new("pool", *key), bytes.clone())
                .await
                .unwrap();
        }
        buckets
    }

    fn request(keys: &[&str]) -> TeleportRequest {
        TeleportRequest {
            fragments: keys.iter().map(|k| StorageLocation::new("pool", *k)).collect(),
            destination: StorageLocation::new("code", "deployables/api.zip"),
        }
    }

    #[tokio::test]
    async fn merges_disjoint_fragments() {
        let buckets = seeded(&[
            ("f/1", encoded(&[("a/b/c/x", "1")])),
            ("f/2", encoded(&[("a/d/e/y", "2")])),
        ])
        .await;

        let response = merge_fragments(&buckets, &request(&["f/1", "f/2"])).await.unwrap();
        assert_eq!(response.fragment_count, 2);

        let written = buckets.read(&response.destination).await.unwrap();
        assert_eq!(written.len() as u64, response.merged_size_bytes);

        let merged = Archive::from_zip(&written).unwrap();
        assert_eq!(merged.get("a/b/c/x").unwrap().as_ref(), b"1");
        assert_eq!(merged.get("a/d/e/y").unwrap().as_ref(), b"2");
    }

    #[tokio::test]
    async fn merge_is_idempotent_and_order_independent() {
        let buckets = seeded(&[
            ("f/1", encoded(&[("index.js", "1")])),
            ("f/2", encoded(&[("node_modules/ms/index.js", "2")])),
        ])
        .await;

        merge_fragments(&buckets, &request(&["f/1", "f/2"])).await.unwrap();
        let first = buckets.read(&request(&[]).destination).await.unwrap();
        merge_fragments(&buckets, &request(&["f/2", "f/1"])).await.unwrap();
        let second = buckets.read(&request(&[]).destination).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn conflicting_fragments_write_nothing() {
        let buckets = seeded(&[
            ("f/1", encoded(&[("a/b/c/x", "1")])),
            ("f/2", encoded(&[("a/b/c/x", "2")])),
        ])
        .await;

        let err = merge_fragments(&buckets, &request(&["f/1", "f/2"])).await.unwrap_err();
        assert!(matches!(
            err,
            TeleportError::Archive(conductor_archive::ArchiveError::ArchiveConflict { .. })
        ));
        assert!(buckets
            .read(&request(&[]).destination)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn every_missing_fragment_is_reported() {
        let buckets = seeded(&[("f/1", encoded(&[("x", "1")]))]).await;

        let err = merge_fragments(&buckets, &request(&["f/1", "f/2", "f/3"]))
            .await
            .unwrap_err();
        match err {
            TeleportError::Transfer { failed } => {
                let keys: Vec<_> = failed.iter().map(|f| f.location.key.as_str()).collect();
                assert_eq!(keys, vec!["f/2", "f/3"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(buckets
            .read(&request(&[]).destination)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn corrupt_fragment_is_named() {
        let buckets = seeded(&[("f/1", Bytes::from_static(b"garbage"))]).await;
        let err = merge_fragments(&buckets, &request(&["f/1"])).await.unwrap_err();
        assert!(matches!(err, TeleportError::Decode { ref location, .. } if location.key == "f/1"));
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let buckets = seeded(&[]).await;
        let err = merge_fragments(&buckets, &request(&[])).await.unwrap_err();
        assert!(matches!(err, TeleportError::InvalidRequest(_)));
    }
}
