//! On-chain registry backend.
//!
//! The contract is fixed so callers can be written against it; both
//! operations currently return [`RegistryError::NotImplemented`].

use async_trait::async_trait;
use meld_core::ChipUid;
use meld_crypto::{Ed25519PublicKey, IdentityRecord};

use crate::backend::{BackendKind, KeyRegistry};
use crate::error::RegistryError;

/// Placeholder for a registry stored on a blockchain.
#[derive(Debug, Clone, Default)]
pub struct BlockchainRegistry {
    /// Chain or contract the registry would target.
    pub network: Option<String>,
}

impl BlockchainRegistry {
    pub fn new(network: Option<String>) -> Self {
        Self { network }
    }
}

#[async_trait]
impl KeyRegistry for BlockchainRegistry {
    fn kind(&self) -> BackendKind {
        BackendKind::Blockchain
    }

    async fn register_identity(&self, _record: &IdentityRecord) -> Result<String, RegistryError> {
        Err(RegistryError::NotImplemented {
            backend: "blockchain",
            operation: "register_identity",
        })
    }

    async fn lookup_public_key(
        &self,
        _chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError> {
        Err(RegistryError::NotImplemented {
            backend: "blockchain",
            operation: "lookup_public_key",
        })
    }
}
