//! # meld-api — HTTP Service for Meld Nodes
//!
//! ## API Surface
//!
//! | Path                          | Module                 | Purpose |
//! |-------------------------------|------------------------|---------|
//! | `/registry/register`          | [`routes::registry`]   | Centralized key registration |
//! | `/registry/lookup/{chipUID}`  | [`routes::registry`]   | Centralized key lookup |
//! | `/p2p/{contentHash}`          | [`routes::p2p`]        | Gateway-format record fetch |
//! | `/p2p/records`                | [`routes::p2p`]        | Record publication |
//! | `/auth/challenge`             | [`routes::auth`]       | Challenge issuance |
//! | `/auth/verify`                | [`routes::auth`]       | Challenge-response verification |
//! | `/health`                     | this module            | Liveness and counters |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → Handler
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::middleware::metrics::{metrics_middleware, ApiMetrics, MetricsSnapshot};
use crate::state::AppState;

/// Assemble the application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    app_with_metrics(state, ApiMetrics::new())
}

/// As [`app`], recording into caller-supplied counters.
pub fn app_with_metrics(state: AppState, metrics: ApiMetrics) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(routes::registry::router())
        .merge(routes::p2p::router())
        .merge(routes::auth::router())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(metrics))
        .with_state(state)
}

/// Bind `state.config`'s address and serve until `shutdown` resolves.
///
/// The discovery node is started if it is not already running and stopped
/// once the server has drained.
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = state.config.socket_addr();
    let node = std::sync::Arc::clone(&state.node);
    if !node.is_running() {
        node.start().map_err(std::io::Error::other)?;
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, peer_id = %node.peer_id(), "meld api listening");
    let result = axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await;
    node.stop().await;
    result
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    peer_id: String,
    node_running: bool,
    records: usize,
    registered_keys: usize,
    #[serde(flatten)]
    traffic: MetricsSnapshot,
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> Json<Health> {
    Json(Health {
        status: "ok",
        peer_id: state.node.peer_id().to_string(),
        node_running: state.node.is_running(),
        records: state.node.record_count(),
        registered_keys: state.registry.len(),
        traffic: metrics.snapshot(),
    })
}
