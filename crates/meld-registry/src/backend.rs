//! The `KeyRegistry` contract shared by every backend.

use async_trait::async_trait;
use meld_core::ChipUid;
use meld_crypto::{Ed25519PublicKey, IdentityRecord};

use crate::error::RegistryError;

/// Which family of backend a registry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Centralized,
    Blockchain,
    PeerToPeer,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Centralized => "centralized",
            Self::Blockchain => "blockchain",
            Self::PeerToPeer => "p2p",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stores and resolves chip public keys.
///
/// `lookup_public_key` returns `Ok(None)` for a chip that is not
/// registered. Implementations absorb transport failures into `Ok(None)`
/// with a logged warning; only malformed input or an unimplemented
/// operation is an `Err`.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether keys returned by this backend come from records whose
    /// self-signature was checked.
    fn yields_verified_keys(&self) -> bool {
        false
    }

    /// Store `record`. Returns a backend-specific identifier
    /// (the chip UID, a content hash, ...).
    async fn register_identity(&self, record: &IdentityRecord) -> Result<String, RegistryError>;

    /// Resolve the registered public key for `chip_uid`.
    async fn lookup_public_key(
        &self,
        chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError>;
}
