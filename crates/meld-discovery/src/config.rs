//! Discovery node configuration.
//!
//! Defaults match the protocol timings: announce every 30 s, drop peers
//! unseen for 5 min, wait 10 s for gossip answers, 5 s for public gateways
//! and 3 s for the local node probe. The whole HTTP probe sequence of one
//! lookup (peers, local node, gateways) is capped at 15 s.

use std::time::Duration;

use url::Url;

use crate::error::DiscoveryError;
use crate::peers::PeerId;

pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_PEER_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCAL_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PROBE_DEADLINE: Duration = Duration::from_secs(15);

/// Configuration for a [`crate::DiscoveryNode`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Identifier announced on the discovery channel.
    pub peer_id: PeerId,
    /// Base URL this node serves records under, if any.
    pub endpoint: Option<Url>,
    pub announce_interval: Duration,
    pub peer_ttl: Duration,
    pub prune_interval: Duration,
    pub broadcast_timeout: Duration,
    pub gateway_timeout: Duration,
    pub local_probe_timeout: Duration,
    /// Budget for all HTTP probes of a single lookup.
    pub probe_deadline: Duration,
    /// Public content gateways, probed as `GET {gateway}{hash}`.
    pub gateways: Vec<Url>,
    /// A co-located node, probed before the public gateways.
    pub local_node: Option<Url>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId::random(),
            endpoint: None,
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            peer_ttl: DEFAULT_PEER_TTL,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            local_probe_timeout: DEFAULT_LOCAL_PROBE_TIMEOUT,
            probe_deadline: DEFAULT_PROBE_DEADLINE,
            gateways: Vec::new(),
            local_node: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `MELD_P2P_PEER_ID` (default: random)
    /// - `MELD_P2P_ENDPOINT` (default: none)
    /// - `MELD_P2P_GATEWAYS` comma-separated URLs (default: none)
    /// - `MELD_P2P_LOCAL_NODE` (default: none)
    /// - `MELD_P2P_BROADCAST_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Self, DiscoveryError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("MELD_P2P_PEER_ID") {
            config.peer_id = PeerId::new(raw)?;
        }
        config.endpoint = optional_url("MELD_P2P_ENDPOINT")?;
        config.local_node = optional_url("MELD_P2P_LOCAL_NODE")?;
        if let Ok(raw) = std::env::var("MELD_P2P_GATEWAYS") {
            config.gateways = parse_url_list("MELD_P2P_GATEWAYS", &raw)?;
        }
        if let Some(secs) = std::env::var("MELD_P2P_BROADCAST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.broadcast_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn optional_url(var: &'static str) -> Result<Option<Url>, DiscoveryError> {
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => Url::parse(raw.trim())
            .map(Some)
            .map_err(|e| DiscoveryError::Config {
                var,
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

fn parse_url_list(var: &'static str, raw: &str) -> Result<Vec<Url>, DiscoveryError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Url::parse(s).map_err(|e| DiscoveryError::Config {
                var,
                reason: format!("{s:?}: {e}"),
            })
        })
        .collect()
}
