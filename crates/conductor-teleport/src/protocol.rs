//! Teleport request and response payloads.
//!
//! ```json
//! {"fragments": [{"bucket": "b", "key": "ttl-7d/fragments/…"}],
//!  "destination": {"bucket": "b", "key": "deployables/app.zip"}}
//! ```
//!
//! The remote side answers with an invocation envelope:
//!
//! ```json
//! {"statusCode": 200,
//!  "body": {"writtenTo": {"bucket": "b", "key": "…"}, "numFragments": 3, "mergedSize": 1024}}
//! ```

use conductor_pool::StorageLocation;
use serde::{Deserialize, Serialize};

use crate::error::{FragmentFailure, TeleportError};

/// Merge `fragments` into one archive written to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportRequest {
    /// Pooled fragment archives.
    pub fragments: Vec<StorageLocation>,
    /// Where the merged archive goes.
    pub destination: StorageLocation,
}

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportResponse {
    /// Where the merged archive was written.
    pub destination: StorageLocation,
    /// Number of fragments merged.
    pub fragment_count: usize,
    /// Size of the merged archive in bytes.
    pub merged_size_bytes: u64,
}

/// Invocation envelope returned by the remote merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// HTTP-style status code.
    pub status_code: u16,
    /// Result payload.
    pub body: InvocationBody,
}

/// Body of an [`InvocationResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InvocationBody {
    /// The merge succeeded.
    #[serde(rename_all = "camelCase")]
    Merged {
        /// Destination of the merged archive.
        written_to: StorageLocation,
        /// Number of fragments merged.
        num_fragments: usize,
        /// Size of the merged archive in bytes.
        merged_size: u64,
    },
    /// The merge failed.
    #[serde(rename_all = "camelCase")]
    Failed {
        /// Diagnostic message.
        error: String,
        /// Fragments that could not be read, if that was the cause.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_fragments: Vec<FragmentFailure>,
    },
}

impl InvocationResponse {
    /// Envelope for a successful merge.
    #[must_use]
    pub fn success(response: TeleportResponse) -> Self {
        Self {
            status_code: 200,
            body: InvocationBody::Merged {
                written_to: response.destination,
                num_fragments: response.fragment_count,
                merged_size: response.merged_size_bytes,
            },
        }
    }

    /// Envelope for a failed merge.
    #[must_use]
    pub fn failure(status_code: u16, error: &TeleportError) -> Self {
        let failed_fragments = match error {
            TeleportError::Transfer { failed } => failed.clone(),
            _ => Vec::new(),
        };
        Self {
            status_code,
            body: InvocationBody::Failed {
                error: error.to_string(),
                failed_fragments,
            },
        }
    }

    /// Turn the envelope back into a merge result.
    pub fn into_result(self) -> Result<TeleportResponse, TeleportError> {
        match self.body {
            InvocationBody::Merged {
                written_to,
                num_fragments,
                merged_size,
            } if self.status_code == 200 => Ok(TeleportResponse {
                destination: written_to,
                fragment_count: num_fragments,
                merged_size_bytes: merged_size,
            }),
            InvocationBody::Failed {
                failed_fragments, ..
            } if !failed_fragments.is_empty() => Err(TeleportError::Transfer {
                failed: failed_fragments,
            }),
            InvocationBody::Failed { error, .. } => Err(TeleportError::Remote {
                status: self.status_code,
                message: error,
            }),
            InvocationBody::Merged { .. } => Err(TeleportError::Remote {
                status: self.status_code,
                message: "merge reported success with a failure status".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn request_matches_wire_format() {
        let request: TeleportRequest = serde_json::from_str(
            r#"{"fragments": [{"bucket": "pool", "key": "ttl-7d/fragments/aa"}],
                "destination": {"bucket": "code", "key": "deployables/api.zip"}}"#,
        )
        .unwrap();
        assert_eq!(request.fragments[0].key, "ttl-7d/fragments/aa");
        assert_eq!(request.destination.bucket, "code");
    }

    #[test]
    fn success_envelope_uses_camel_case() {
        let envelope = InvocationResponse::success(TeleportResponse {
            destination: StorageLocation::new("code", "deployables/api.zip"),
            fragment_count: 3,
            merged_size_bytes: 1024,
        });

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "statusCode": 200,
                "body": {
                    "writtenTo": {"bucket": "code", "key": "deployables/api.zip"},
                    "numFragments": 3,
                    "mergedSize": 1024
                }
            })
        );

        let back: InvocationResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.into_result().unwrap().fragment_count, 3);
    }

    #[test]
    fn failure_envelope_preserves_failed_fragments() {
        let error = TeleportError::Transfer {
            failed: vec![FragmentFailure {
                location: StorageLocation::new("pool", "ttl-7d/fragments/gone"),
                message: "not found".to_owned(),
            }],
        };
        let envelope = InvocationResponse::failure(502, &error);
        let back: InvocationResponse =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        match back.into_result().unwrap_err() {
            TeleportError::Transfer { failed } => assert_eq!(failed.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plain_failure_is_remote_error() {
        let envelope = InvocationResponse::failure(409, &TeleportError::InvalidRequest("x".into()));
        assert!(matches!(
            envelope.into_result().unwrap_err(),
            TeleportError::Remote { status: 409, .. }
        ));
    }
}
