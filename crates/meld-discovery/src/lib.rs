//! # meld-discovery — Peer Discovery for Identity Records
//!
//! Nodes gossip over a shared channel using four message kinds
//! (`peer-announcement`, `identity-announcement`, `hash-request`,
//! `hash-response`) and fetch records over HTTP from peers and gateways
//! that serve `GET {endpoint}{contentHash}`.
//!
//! Every record that enters a node, whether published locally, fetched
//! over HTTP, or received in a `hash-response`, is verified first. Records
//! that fail verification are dropped without surfacing an error.

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod node;
pub mod peers;
pub mod store;

pub use bus::LocalBus;
pub use config::DiscoveryConfig;
pub use error::DiscoveryError;
pub use gateway::GatewayClient;
pub use messages::{
    DiscoveryMessage, HashRequest, HashResponse, IdentityAnnouncement, PeerAnnouncement,
};
pub use node::DiscoveryNode;
pub use peers::{PeerId, PeerNode, PeerTable};
pub use store::{locator_hash, RecordStore};
