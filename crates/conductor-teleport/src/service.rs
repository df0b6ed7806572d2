//! HTTP API for the teleport service.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use conductor_pool::Buckets;
use serde::Serialize;
use tracing::{error, info};

use crate::error::TeleportError;
use crate::merge::merge_fragments;
use crate::protocol::{InvocationResponse, TeleportRequest};

/// Shared state for the teleport service.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Buckets the service may read fragments from and write results to.
    pub buckets: Buckets,
}

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/teleport", post(teleport))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

fn status_for(error: &TeleportError) -> StatusCode {
    match error {
        TeleportError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        TeleportError::Archive(_) | TeleportError::Decode { .. } => StatusCode::CONFLICT,
        TeleportError::Transfer { .. } | TeleportError::Pool(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn teleport(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TeleportRequest>,
) -> (StatusCode, Json<InvocationResponse>) {
    match merge_fragments(&state.buckets, &request).await {
        Ok(response) => {
            info!(
                destination = %response.destination,
                fragments = response.fragment_count,
                size = response.merged_size_bytes,
                "teleport complete"
            );
            (StatusCode::OK, Json(InvocationResponse::success(response)))
        }
        Err(e) => {
            error!(destination = %request.destination, error = %e, "teleport failed");
            let status = status_for(&e);
            (status, Json(InvocationResponse::failure(status.as_u16(), &e)))
        }
    }
}
