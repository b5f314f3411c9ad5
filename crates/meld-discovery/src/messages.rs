//! # Discovery Wire Messages
//!
//! Frames on the discovery channel are JSON objects of the form
//! `{"type": "<kind>", "data": {...}}` where `<kind>` is one of
//! `peer-announcement`, `identity-announcement`, `hash-request`,
//! `hash-response`. Field names inside `data` are camelCase.
//!
//! Receivers decode into [`DiscoveryMessage`] and dispatch with an
//! exhaustive `match`; a new variant is a compile error at every handler.

use std::collections::BTreeSet;

use meld_core::{ChipUid, ContentDigest, Timestamp};
use meld_crypto::IdentityRecord;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::peers::PeerId;

/// Periodic liveness broadcast of a peer and the hashes it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAnnouncement {
    pub peer_id: PeerId,
    /// Base URL serving `GET {endpoint}{contentHash}`, if the peer serves records.
    pub endpoint: Option<Url>,
    pub timestamp: Timestamp,
    pub known_hashes: BTreeSet<ContentDigest>,
}

/// Broadcast on registration so peers can prefetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAnnouncement {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    pub content_hash: ContentDigest,
    pub timestamp: Timestamp,
}

/// Gossip lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashRequest {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    pub request_id: Uuid,
    pub requester_id: PeerId,
}

/// Gossip lookup response carrying the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashResponse {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    pub request_id: Uuid,
    pub record: IdentityRecord,
}

/// Every message that travels on the discovery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DiscoveryMessage {
    PeerAnnouncement(PeerAnnouncement),
    IdentityAnnouncement(IdentityAnnouncement),
    HashRequest(HashRequest),
    HashResponse(HashResponse),
}

impl DiscoveryMessage {
    /// Encode as a JSON frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON frame.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PeerAnnouncement(_) => "peer-announcement",
            Self::IdentityAnnouncement(_) => "identity-announcement",
            Self::HashRequest(_) => "hash-request",
            Self::HashResponse(_) => "hash-response",
        }
    }
}
