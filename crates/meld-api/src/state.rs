//! # Application State
//!
//! Shared handles passed to every route handler via Axum's `State`
//! extractor. All fields are `Arc`s, so cloning is cheap.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use meld_auth::{AuthConfig, ChallengeAuthenticator};
use meld_discovery::{DiscoveryConfig, DiscoveryError, DiscoveryNode, LocalBus};
use meld_registry::{KeyRegistry, MemoryRegistry, P2PRegistry, RegistryContext};
use thiserror::Error;

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 8080;

/// Listener configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid {var}: {value:?}")]
pub struct ApiConfigError {
    pub var: &'static str,
    pub value: String,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `MELD_API_HOST` (default: `0.0.0.0`)
    /// - `MELD_API_PORT` (default: `8080`)
    pub fn from_env() -> Result<Self, ApiConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("MELD_API_HOST") {
            config.host = raw.trim().parse().map_err(|_| ApiConfigError {
                var: "MELD_API_HOST",
                value: raw.clone(),
            })?;
        }
        if let Ok(raw) = std::env::var("MELD_API_PORT") {
            config.port = raw.trim().parse().map_err(|_| ApiConfigError {
                var: "MELD_API_PORT",
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Keys accepted through `POST /registry/register`.
    pub registry: Arc<MemoryRegistry>,
    /// The node whose content-addressed store backs `GET /p2p/{hash}`.
    pub node: Arc<DiscoveryNode>,
    pub authenticator: Arc<ChallengeAuthenticator>,
    pub config: ApiConfig,
}

impl AppState {
    /// Assemble state around an existing discovery node.
    ///
    /// The authenticator resolves keys through the node first and the
    /// in-process registry second.
    pub fn with_node(config: ApiConfig, auth: AuthConfig, node: Arc<DiscoveryNode>) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let p2p: Arc<dyn KeyRegistry> = Arc::new(P2PRegistry::from_node(Arc::clone(&node)));
        let centralized: Arc<dyn KeyRegistry> = registry.clone();
        let context = RegistryContext::builder()
            .p2p(p2p)
            .centralized(centralized)
            .build();
        Self {
            registry,
            node,
            authenticator: Arc::new(ChallengeAuthenticator::new(auth, Arc::new(context))),
            config,
        }
    }

    /// State with default configuration and a fresh, unstarted node on its
    /// own bus.
    pub fn standalone() -> Result<Self, DiscoveryError> {
        let node = DiscoveryNode::new(DiscoveryConfig::default(), LocalBus::default())?;
        Ok(Self::with_node(
            ApiConfig::default(),
            AuthConfig::default(),
            Arc::new(node),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_all_interfaces() {
        let config = ApiConfig::default();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_standalone_state_is_empty() {
        let state = AppState::standalone().unwrap();
        assert!(state.registry.is_empty());
        assert_eq!(state.node.record_count(), 0);
        assert!(!state.node.is_running());
    }
}
