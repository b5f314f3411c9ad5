//! # Integration Tests for meld-api
//!
//! Registry endpoints, gateway-format record serving, challenge issuance and
//! verification, and a client/server contract check against the centralized
//! registry client.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use meld_api::middleware::metrics::ApiMetrics;
use meld_api::state::{ApiConfig, AppState};
use meld_auth::AuthConfig;
use meld_core::{ChipUid, DeviceId};
use meld_crypto::{did_key, enroll, IdentityDeriver, IdentityRecord};
use meld_discovery::{locator_hash, DiscoveryConfig, DiscoveryNode, LocalBus};
use meld_registry::{CentralizedRegistry, KeyRegistry, RegistryClientConfig};
use tower::ServiceExt;

fn state() -> AppState {
    AppState::standalone().unwrap()
}

/// State whose node gives up on gossip quickly, for tests that fall
/// through to the in-process registry.
fn fast_state() -> AppState {
    let config = DiscoveryConfig {
        broadcast_timeout: Duration::from_millis(50),
        ..DiscoveryConfig::default()
    };
    let node = DiscoveryNode::new(config, LocalBus::default()).unwrap();
    AppState::with_node(ApiConfig::default(), AuthConfig::default(), Arc::new(node))
}

fn chip() -> ChipUid {
    ChipUid::new("04:AA:BB:CC:DD:EE:FF").unwrap()
}

fn enrollment(pin: &str) -> meld_crypto::Enrollment {
    enroll(
        &IdentityDeriver::default(),
        &chip(),
        pin,
        &DeviceId::new("reader-1").unwrap(),
    )
    .unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_body(record: &IdentityRecord) -> serde_json::Value {
    serde_json::json!({
        "chipUID": record.chip_uid,
        "publicKey": record.public_key.as_bytes().to_vec(),
        "deviceID": record.device_id,
        "did": record.did,
    })
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn test_health() {
    let response = meld_api::app(state()).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records"], 0);
    assert_eq!(body["nodeRunning"], false);
}

#[tokio::test]
async fn test_metrics_count_requests_and_errors() {
    let metrics = ApiMetrics::new();
    let app = meld_api::app_with_metrics(state(), metrics.clone());
    app.clone().oneshot(get("/health")).await.unwrap();
    app.clone().oneshot(get("/registry/lookup/04:01")).await.unwrap();
    assert_eq!(metrics.requests(), 2);
    assert_eq!(metrics.errors(), 1);

    let body = body_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(body["requests"], 2);
    assert_eq!(body["errors"], 1);
    assert_eq!(body["registryRequests"], 1);
    assert_eq!(body["p2pRequests"], 0);
    assert_eq!(body["authRequests"], 0);
}

// -- Registry -----------------------------------------------------------------

#[tokio::test]
async fn test_register_then_lookup() {
    let state = state();
    let record = enrollment("1234").record;

    let response = meld_api::app(state.clone())
        .oneshot(json_request("POST", "/registry/register", register_body(&record)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"success": true, "chipUID": "04:AA:BB:CC:DD:EE:FF"})
    );

    let response = meld_api::app(state)
        .oneshot(get("/registry/lookup/04:AA:BB:CC:DD:EE:FF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(
        body["publicKey"],
        serde_json::json!(record.public_key.as_bytes().to_vec())
    );
}

#[tokio::test]
async fn test_lookup_unknown_chip_is_404() {
    let response = meld_api::app(state())
        .oneshot(get("/registry/lookup/04:99"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"success": false, "error": "Public key not found in registry"})
    );
}

#[tokio::test]
async fn test_register_rejects_short_key() {
    let record = enrollment("1234").record;
    let mut body = register_body(&record);
    body["publicKey"] = serde_json::json!([1, 2, 3]);
    let response = meld_api::app(state())
        .oneshot(json_request("POST", "/registry/register", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_register_rejects_mismatched_did() {
    let record = enrollment("1234").record;
    let other = enrollment("9999").record;
    let mut body = register_body(&record);
    body["did"] = serde_json::json!(did_key(&other.public_key));
    let state = state();
    let response = meld_api::app(state.clone())
        .oneshot(json_request("POST", "/registry/register", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn test_register_rejects_malformed_json() {
    let request = Request::builder()
        .method("POST")
        .uri("/registry/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = meld_api::app(state()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// -- P2P records --------------------------------------------------------------

#[tokio::test]
async fn test_p2p_serves_record_by_content_hash_and_locator() {
    let state = state();
    let record = enrollment("1234").record;
    let hash = state.node.publish_record(record.clone()).unwrap();

    let response = meld_api::app(state.clone())
        .oneshot(get(&format!("/p2p/{hash}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served: IdentityRecord = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(served, record);
    assert!(served.verify().is_ok());

    let locator = locator_hash(&chip()).unwrap();
    let response = meld_api::app(state)
        .oneshot(get(&format!("/p2p/{locator}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_p2p_unknown_hash_is_404_and_bad_hash_is_422() {
    let app = meld_api::app(state());
    let response = app
        .clone()
        .oneshot(get(&format!("/p2p/{}", "ab".repeat(32))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let response = app.oneshot(get("/p2p/not-a-hash")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_p2p_publish_rejects_tampered_record() {
    let state = state();
    let mut record = enrollment("1234").record;
    record.device_id = DeviceId::new("someone-else").unwrap();
    let response = meld_api::app(state.clone())
        .oneshot(json_request(
            "POST",
            "/p2p/records",
            serde_json::to_value(&record).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(state.node.record_count(), 0);
}

#[tokio::test]
async fn test_p2p_publish_returns_content_hash() {
    let state = state();
    let record = enrollment("1234").record;
    let response = meld_api::app(state.clone())
        .oneshot(json_request(
            "POST",
            "/p2p/records",
            serde_json::to_value(&record).unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["contentHash"], record.content_hash.to_hex());
    assert_eq!(state.node.local_record(&chip()), Some(record));
}

// -- Challenges ---------------------------------------------------------------

#[tokio::test]
async fn test_issue_challenge_with_context() {
    let response = meld_api::app(state())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/challenge?context=door-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let challenge = body["challenge"].as_str().unwrap();
    assert!(challenge.starts_with("meld:v1:"));
    assert!(challenge.ends_with(":door-1"));
    assert!(body["expiresAt"].is_string());
}

#[tokio::test]
async fn test_issued_challenge_authenticates_once() {
    let state = fast_state();
    let record = enrollment("1234").record;
    meld_api::app(state.clone())
        .oneshot(json_request("POST", "/registry/register", register_body(&record)))
        .await
        .unwrap();

    let response = meld_api::app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/challenge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    let challenge = body["challenge"].as_str().unwrap().to_string();

    let outcome = state
        .authenticator
        .authenticate(&chip(), "1234", Some(&challenge))
        .await
        .unwrap();
    assert!(outcome.authenticated);
    let replay = state
        .authenticator
        .authenticate(&chip(), "1234", Some(&challenge))
        .await
        .unwrap();
    assert!(!replay.authenticated);
}

async fn issue(state: &AppState) -> String {
    let response = meld_api::app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/challenge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    body_json(response).await["challenge"]
        .as_str()
        .unwrap()
        .to_string()
}

fn verify_body(challenge: &str, pin: &str, state: &AppState) -> serde_json::Value {
    let proof = state
        .authenticator
        .prove_identity(&chip(), pin, challenge)
        .unwrap();
    serde_json::to_value(proof.into_response(challenge)).unwrap()
}

#[tokio::test]
async fn test_verify_accepts_issued_challenge_once() {
    let state = fast_state();
    let record = enrollment("1234").record;
    meld_api::app(state.clone())
        .oneshot(json_request("POST", "/registry/register", register_body(&record)))
        .await
        .unwrap();
    let challenge = issue(&state).await;
    let body = verify_body(&challenge, "1234", &state);

    let response = meld_api::app(state.clone())
        .oneshot(json_request("POST", "/auth/verify", body.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["authenticated"], true);
    assert_eq!(outcome["state"], "VERIFIED");
    assert_eq!(outcome["did"], record.did.as_str());
    assert!(outcome["sessionToken"].as_str().unwrap().starts_with("meld_04:AA"));

    let response = meld_api::app(state.clone())
        .oneshot(json_request("POST", "/auth/verify", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let replay = body_json(response).await;
    assert_eq!(replay["authenticated"], false);
    assert_eq!(replay["state"], "REJECTED");
    assert_eq!(replay["error"], meld_auth::ERR_CHALLENGE_REJECTED);
}

#[tokio::test]
async fn test_verify_reports_wrong_pin_and_unregistered_chip() {
    let state = fast_state();
    let challenge = issue(&state).await;
    let response = meld_api::app(state.clone())
        .oneshot(json_request(
            "POST",
            "/auth/verify",
            verify_body(&challenge, "1234", &state),
        ))
        .await
        .unwrap();
    let outcome = body_json(response).await;
    assert_eq!(outcome["state"], "LOOKUP_FAILED");
    assert_eq!(outcome["error"], meld_auth::ERR_KEY_NOT_FOUND);

    let record = enrollment("1234").record;
    meld_api::app(state.clone())
        .oneshot(json_request("POST", "/registry/register", register_body(&record)))
        .await
        .unwrap();
    let challenge = issue(&state).await;
    let response = meld_api::app(state.clone())
        .oneshot(json_request(
            "POST",
            "/auth/verify",
            verify_body(&challenge, "9999", &state),
        ))
        .await
        .unwrap();
    let outcome = body_json(response).await;
    assert_eq!(outcome["authenticated"], false);
    assert_eq!(outcome["error"], meld_auth::ERR_INVALID_SIGNATURE);
}

#[tokio::test]
async fn test_verify_rejects_unissued_and_malformed_input() {
    let state = fast_state();
    let foreign = meld_auth::Challenge::generate(None).unwrap().to_string();
    let response = meld_api::app(state.clone())
        .oneshot(json_request(
            "POST",
            "/auth/verify",
            verify_body(&foreign, "1234", &state),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["state"], "REJECTED");

    let mut bad_signature = verify_body(&foreign, "1234", &state);
    bad_signature["signature"] = serde_json::json!("abcd");
    let response = meld_api::app(state.clone())
        .oneshot(json_request("POST", "/auth/verify", bad_signature))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut bad_challenge = verify_body(&foreign, "1234", &state);
    bad_challenge["challenge"] = serde_json::json!("not-a-challenge");
    let response = meld_api::app(state)
        .oneshot(json_request("POST", "/auth/verify", bad_challenge))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// -- Client/server contract ---------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_centralized_client_against_live_server() {
    let state = state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = meld_api::app(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let client = CentralizedRegistry::new(RegistryClientConfig::new(
        format!("http://{addr}").parse().unwrap(),
    ))
    .unwrap();
    let record = enrollment("1234").record;
    let id = client.register_identity(&record).await.unwrap();
    assert_eq!(id, "04:AA:BB:CC:DD:EE:FF");
    assert_eq!(
        client.fetch_public_key(&chip()).await.unwrap(),
        Some(record.public_key)
    );
    assert_eq!(
        client
            .fetch_public_key(&ChipUid::new("04:01").unwrap())
            .await
            .unwrap(),
        None
    );
    assert_eq!(state.registry.len(), 1);

    server.abort();
}
