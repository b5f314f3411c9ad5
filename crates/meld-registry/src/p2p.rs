//! Peer-to-peer registry backend over a [`DiscoveryNode`].
//!
//! Registration stores the record in the node's content-addressed store and
//! announces it. Lookup runs the node's discovery sequence. The returned
//! identifier is the record's content hash.
//!
//! The node's background task is started by [`P2PRegistry::start`] and runs
//! until [`P2PRegistry::shutdown`] or until the last reference to the node
//! is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use meld_core::ChipUid;
use meld_crypto::{Ed25519PublicKey, IdentityRecord};
use meld_discovery::{DiscoveryConfig, DiscoveryNode, LocalBus};

use crate::backend::{BackendKind, KeyRegistry};
use crate::error::RegistryError;

#[derive(Debug, Clone)]
pub struct P2PRegistry {
    node: Arc<DiscoveryNode>,
}

impl P2PRegistry {
    /// Wrap an existing node without changing its lifecycle.
    pub fn from_node(node: Arc<DiscoveryNode>) -> Self {
        Self { node }
    }

    /// Build a node on `bus` and start its background task.
    pub fn start(config: DiscoveryConfig, bus: LocalBus) -> Result<Self, RegistryError> {
        let node = DiscoveryNode::new(config, bus)?;
        node.start()?;
        Ok(Self {
            node: Arc::new(node),
        })
    }

    pub fn node(&self) -> &Arc<DiscoveryNode> {
        &self.node
    }

    /// Stop the node's background task.
    pub async fn shutdown(&self) {
        self.node.stop().await;
    }
}

#[async_trait]
impl KeyRegistry for P2PRegistry {
    fn kind(&self) -> BackendKind {
        BackendKind::PeerToPeer
    }

    fn yields_verified_keys(&self) -> bool {
        true
    }

    async fn register_identity(&self, record: &IdentityRecord) -> Result<String, RegistryError> {
        let hash = self.node.publish_record(record.clone())?;
        Ok(hash.to_hex())
    }

    async fn lookup_public_key(
        &self,
        chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError> {
        Ok(self
            .node
            .lookup(chip_uid)
            .await
            .map(|record| record.public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_core::DeviceId;
    use meld_crypto::{enroll, IdentityDeriver};
    use meld_discovery::PeerId;
    use std::time::Duration;

    fn config(id: &str) -> DiscoveryConfig {
        DiscoveryConfig {
            peer_id: PeerId::new(id).unwrap(),
            broadcast_timeout: Duration::from_millis(300),
            ..DiscoveryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_register_returns_content_hash_and_peer_resolves_it() {
        let bus = LocalBus::default();
        let a = P2PRegistry::start(config("a"), bus.clone()).unwrap();
        let b = P2PRegistry::start(config("b"), bus.clone()).unwrap();
        let chip = ChipUid::new("04:AA:01").unwrap();
        let enrollment = enroll(
            &IdentityDeriver::default(),
            &chip,
            "1234",
            &DeviceId::new("node-a").unwrap(),
        )
        .unwrap();

        let id = a.register_identity(&enrollment.record).await.unwrap();
        assert_eq!(id, enrollment.record.content_hash.to_hex());
        assert_eq!(
            b.lookup_public_key(&chip).await.unwrap(),
            Some(enrollment.identity.public_key)
        );
        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_tampered_record_is_rejected() {
        let registry = P2PRegistry::start(config("a"), LocalBus::default()).unwrap();
        let mut record = enroll(
            &IdentityDeriver::default(),
            &ChipUid::new("04:AA:02").unwrap(),
            "1234",
            &DeviceId::new("node-a").unwrap(),
        )
        .unwrap()
        .record;
        record.registered_at = record.registered_at.plus(Duration::from_secs(1));
        assert!(matches!(
            registry.register_identity(&record).await,
            Err(RegistryError::Discovery(_))
        ));
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_chip_resolves_to_none() {
        let registry = P2PRegistry::start(config("a"), LocalBus::default()).unwrap();
        assert_eq!(
            registry
                .lookup_public_key(&ChipUid::new("04:FF").unwrap())
                .await
                .unwrap(),
            None
        );
        registry.shutdown().await;
    }
}
