//! # Content-Addressed Record Endpoints
//!
//! `GET /p2p/{contentHash}` serves a verified [`IdentityRecord`] from the
//! node's store in the same shape public gateways use, so a node's
//! `/p2p` base URL can be listed as another node's gateway. Both content
//! hashes and per-chip locator hashes resolve.
//!
//! `POST /p2p/records` publishes a self-signed record through the node.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use meld_core::ContentDigest;
use meld_crypto::IdentityRecord;
use meld_discovery::DiscoveryError;
use serde::Serialize;

use crate::error::{extract_json, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/p2p/records", post(publish))
        .route("/p2p/{content_hash}", get(fetch))
}

async fn fetch(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<IdentityRecord>, AppError> {
    let hash = ContentDigest::from_hex(&raw)?;
    state
        .node
        .record_by_hash(&hash)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("record {hash}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    content_hash: ContentDigest,
}

async fn publish(
    State(state): State<AppState>,
    body: Result<Json<IdentityRecord>, JsonRejection>,
) -> Result<Json<PublishResponse>, AppError> {
    let record = extract_json(body)?;
    let content_hash = state.node.publish_record(record).map_err(|e| match e {
        DiscoveryError::Record(e) => AppError::Validation(e.to_string()),
        other => AppError::Internal(other.to_string()),
    })?;
    Ok(Json(PublishResponse { content_hash }))
}
