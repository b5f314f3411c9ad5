//! # Request Metrics
//!
//! Counters reported by `GET /health`:
//!
//! | Field | Counts |
//! |-------|--------|
//! | `requests` | every response |
//! | `errors` | 4xx and 5xx responses |
//! | `registryRequests` | `/registry/*` (centralized key registration and lookup) |
//! | `p2pRequests` | `/p2p/*` (record fetches by content or locator hash, publication) |
//! | `authRequests` | `/auth/*` (challenge issuance and verification) |
//!
//! Counters live in process memory and reset on restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    errors: AtomicU64,
    registry: AtomicU64,
    p2p: AtomicU64,
    auth: AtomicU64,
}

/// Shared counters. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    counters: Arc<Counters>,
}

/// Point-in-time copy of [`ApiMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub registry_requests: u64,
    pub p2p_requests: u64,
    pub auth_requests: u64,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.counters.requests.load(Ordering::Relaxed)
    }

    /// Responses with a 4xx or 5xx status.
    pub fn errors(&self) -> u64 {
        self.counters.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            requests: c.requests.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            registry_requests: c.registry.load(Ordering::Relaxed),
            p2p_requests: c.p2p.load(Ordering::Relaxed),
            auth_requests: c.auth.load(Ordering::Relaxed),
        }
    }

    fn record(&self, path: &str, status: StatusCode) {
        let c = &self.counters;
        c.requests.fetch_add(1, Ordering::Relaxed);
        if status.is_client_error() || status.is_server_error() {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        let surface = match path.split('/').nth(1) {
            Some("registry") => Some(&c.registry),
            Some("p2p") => Some(&c.p2p),
            Some("auth") => Some(&c.auth),
            _ => None,
        };
        if let Some(counter) = surface {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Count every response, reading counters from the `ApiMetrics` extension.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let path = request.uri().path().to_owned();
    let response = next.run(request).await;
    if let Some(m) = metrics {
        m.record(&path, response.status());
    }
    response
}
