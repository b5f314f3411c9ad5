//! `meld serve` — run the HTTP service with a started discovery node.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use meld_api::state::{ApiConfig, AppState};
use meld_auth::AuthConfig;
use meld_discovery::{DiscoveryConfig, DiscoveryNode, LocalBus, PeerId};
use url::Url;

/// Arguments for `meld serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, env = "MELD_API_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    #[arg(long, env = "MELD_API_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Peer identifier announced on the discovery channel (default: random).
    #[arg(long, env = "MELD_P2P_PEER_ID")]
    pub peer_id: Option<String>,
    /// Base URL other nodes can fetch this node's records from,
    /// e.g. `http://10.0.0.5:8080/p2p`.
    #[arg(long, env = "MELD_P2P_ENDPOINT")]
    pub endpoint: Option<Url>,
    /// Content gateway to probe for identity records. Repeatable.
    #[arg(long = "gateway", env = "MELD_P2P_GATEWAYS", value_delimiter = ',')]
    pub gateways: Vec<Url>,
    #[arg(long, env = "MELD_P2P_LOCAL_NODE")]
    pub local_node: Option<Url>,
}

impl ServeArgs {
    fn discovery_config(&self) -> Result<DiscoveryConfig> {
        let mut config = DiscoveryConfig {
            endpoint: self.endpoint.clone(),
            gateways: self.gateways.clone(),
            local_node: self.local_node.clone(),
            ..DiscoveryConfig::default()
        };
        if let Some(raw) = &self.peer_id {
            config.peer_id = PeerId::new(raw.clone()).context("invalid peer id")?;
        }
        Ok(config)
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<u8> {
    let node = DiscoveryNode::new(args.discovery_config()?, LocalBus::default())
        .context("failed to build discovery node")?;
    let api = ApiConfig {
        host: args.host,
        port: args.port,
    };
    let state = AppState::with_node(api, AuthConfig::from_env(), Arc::new(node));

    meld_api::serve(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await
    .with_context(|| format!("HTTP service on {}:{} failed", args.host, args.port))?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_config_from_flags() {
        let args = ServeArgs {
            host: "127.0.0.1".parse().unwrap(),
            port: 9000,
            peer_id: Some("door-node".into()),
            endpoint: Some("http://10.0.0.5:9000/p2p".parse().unwrap()),
            gateways: vec!["https://gw.example/ipfs/".parse().unwrap()],
            local_node: None,
        };
        let config = args.discovery_config().unwrap();
        assert_eq!(config.peer_id.to_string(), "door-node");
        assert_eq!(config.gateways.len(), 1);
        assert!(config.endpoint.is_some());
    }

    #[test]
    fn test_invalid_peer_id_is_rejected() {
        let args = ServeArgs {
            host: "127.0.0.1".parse().unwrap(),
            port: 9000,
            peer_id: Some("has space".into()),
            endpoint: None,
            gateways: Vec::new(),
            local_node: None,
        };
        assert!(args.discovery_config().is_err());
    }
}
