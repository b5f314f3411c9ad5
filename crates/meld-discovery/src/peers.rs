//! # Peer Table
//!
//! Every `peer-announcement` refreshes the sender's entry. Entries whose
//! `last_seen` is older than the configured TTL (five minutes by default)
//! are dropped by [`PeerTable::prune`].

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use meld_core::{ContentDigest, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::DiscoveryError;
use crate::messages::PeerAnnouncement;

/// Maximum peer identifier length.
pub const MAX_PEER_ID_LEN: usize = 128;

/// Identifier a node uses on the discovery channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Validate a peer identifier: non-empty, at most 128 ASCII graphic chars.
    pub fn new(raw: impl Into<String>) -> Result<Self, DiscoveryError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > MAX_PEER_ID_LEN || !raw.chars().all(|c| c.is_ascii_graphic()) {
            return Err(DiscoveryError::InvalidPeerId(raw));
        }
        Ok(Self(raw))
    }

    /// A fresh random identifier.
    pub fn random() -> Self {
        Self(format!("peer-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// What this node knows about a remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerNode {
    pub peer_id: PeerId,
    pub endpoint: Option<Url>,
    pub last_seen: Timestamp,
    pub known_hashes: BTreeSet<ContentDigest>,
}

impl PeerNode {
    /// Whether the peer advertised holding `hash`.
    pub fn holds(&self, hash: &ContentDigest) -> bool {
        self.known_hashes.contains(hash)
    }
}

/// Known peers keyed by id.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, PeerNode>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer from its announcement, stamped `seen_at`.
    ///
    /// Returns `true` if the peer was not previously known.
    pub fn observe(&mut self, announcement: &PeerAnnouncement, seen_at: Timestamp) -> bool {
        let node = PeerNode {
            peer_id: announcement.peer_id.clone(),
            endpoint: announcement.endpoint.clone(),
            last_seen: seen_at,
            known_hashes: announcement.known_hashes.clone(),
        };
        self.peers.insert(node.peer_id.clone(), node).is_none()
    }

    /// Remove peers not seen within `ttl` of `now`. Returns how many were dropped.
    pub fn prune(&mut self, now: Timestamp, ttl: Duration) -> usize {
        let before = self.peers.len();
        self.peers
            .retain(|_, node| node.last_seen.elapsed_until(now) <= ttl);
        before - self.peers.len()
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerNode> {
        self.peers.get(peer_id)
    }

    /// Peers with an endpoint that advertised `hash`.
    pub fn holders_of(&self, hash: &ContentDigest) -> Vec<PeerNode> {
        let mut holders: Vec<PeerNode> = self
            .peers
            .values()
            .filter(|node| node.endpoint.is_some() && node.holds(hash))
            .cloned()
            .collect();
        holders.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        holders
    }

    /// Snapshot of every known peer, most recently seen first.
    pub fn snapshot(&self) -> Vec<PeerNode> {
        let mut all: Vec<PeerNode> = self.peers.values().cloned().collect();
        all.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        all
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
