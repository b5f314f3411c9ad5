//! # Centralized Registry Endpoints
//!
//! Server side of the centralized backend, backed by the in-process
//! [`meld_registry::MemoryRegistry`].
//!
//! | Method | Path | Success | Failure |
//! |--------|------|---------|---------|
//! | POST | `/registry/register` | 200 `{success, chipUID}` | 422 |
//! | GET  | `/registry/lookup/{chipUID}` | 200 `{success, publicKey}` | 404 `{success: false, error}` |

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use meld_auth::ERR_KEY_NOT_FOUND;
use meld_core::{ChipUid, Timestamp};
use meld_crypto::Ed25519PublicKey;
use meld_registry::{LookupResponse, RegisterRequest, RegisterResponse, RegisteredKey};

use crate::error::{extract_json, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/registry/register", post(register))
        .route("/registry/lookup/{chip_uid}", get(lookup))
}

/// Accept a public key whose DID matches it.
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let req = extract_json(body)?;
    let public_key = Ed25519PublicKey::from_slice(&req.public_key)?;
    state.registry.put(RegisteredKey {
        chip_uid: req.chip_uid.clone(),
        public_key,
        device_id: req.device_id,
        did: req.did,
        registered_at: Timestamp::now(),
    })?;
    tracing::info!(chip_uid = %req.chip_uid, "key registered");
    Ok(Json(RegisterResponse {
        success: true,
        chip_uid: req.chip_uid,
    }))
}

async fn lookup(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<(StatusCode, Json<LookupResponse>), AppError> {
    let chip_uid = ChipUid::new(&raw)?;
    let response = match state.registry.get(&chip_uid) {
        Some(entry) => (
            StatusCode::OK,
            Json(LookupResponse {
                success: true,
                public_key: Some(entry.public_key.as_bytes().to_vec()),
                error: None,
            }),
        ),
        None => {
            tracing::debug!(chip_uid = %chip_uid, "lookup miss");
            (
                StatusCode::NOT_FOUND,
                Json(LookupResponse {
                    success: false,
                    public_key: None,
                    error: Some(ERR_KEY_NOT_FOUND.to_string()),
                }),
            )
        }
    };
    Ok(response)
}
