//! # Challenge-Response Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | POST | `/auth/challenge[?context=...]` | none | `{challenge, expiresAt}` |
//! | POST | `/auth/verify` | `{chipUID, challenge, signature}` | `AuthOutcome` |
//!
//! A challenge from `/auth/challenge` is accepted by `/auth/verify` once.
//! Refused, unregistered and mismatched responses are still 200: the
//! outcome body says why. Malformed bodies are 400/422.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use meld_auth::{AuthOutcome, ChallengeResponse, IssuedChallenge};
use serde::Deserialize;

use crate::error::{extract_json, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/challenge", post(issue_challenge))
        .route("/auth/verify", post(verify_response))
}

#[derive(Debug, Deserialize)]
struct ChallengeParams {
    context: Option<String>,
}

async fn issue_challenge(
    State(state): State<AppState>,
    Query(params): Query<ChallengeParams>,
) -> Result<Json<IssuedChallenge>, AppError> {
    let issued = state
        .authenticator
        .generate_challenge(params.context.as_deref())?;
    Ok(Json(issued))
}

async fn verify_response(
    State(state): State<AppState>,
    body: Result<Json<ChallengeResponse>, JsonRejection>,
) -> Result<Json<AuthOutcome>, AppError> {
    let req = extract_json(body)?;
    let outcome = state
        .authenticator
        .verify_response(&req.chip_uid, &req.challenge, &req.signature)
        .await?;
    Ok(Json(outcome))
}
