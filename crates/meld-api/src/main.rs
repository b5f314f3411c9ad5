//! # meld-api — Binary Entry Point
//!
//! Configuration comes from the environment: `MELD_API_*` for the listener,
//! `MELD_P2P_*` for the discovery node and `MELD_AUTH_*` for challenge
//! issuance. Set `MELD_LOG_FORMAT=json` for JSON log lines.

use std::sync::Arc;

use anyhow::Context;
use meld_api::state::{ApiConfig, AppState};
use meld_auth::AuthConfig;
use meld_discovery::{DiscoveryConfig, DiscoveryNode, LocalBus};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("MELD_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let api = ApiConfig::from_env().context("loading MELD_API_* configuration")?;
    let discovery = DiscoveryConfig::from_env().context("loading MELD_P2P_* configuration")?;
    let node = DiscoveryNode::new(discovery, LocalBus::default())
        .context("building discovery node")?;
    let state = AppState::with_node(api, AuthConfig::from_env(), Arc::new(node));

    meld_api::serve(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await
    .context("serving HTTP")?;

    tracing::info!("shut down");
    Ok(())
}
