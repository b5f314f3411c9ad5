//! In-process registry backend.
//!
//! Holds one entry per chip, newest registration wins. The HTTP service
//! uses it as the store behind its centralized registry endpoints, and
//! tests use it as a stand-in for a remote backend.

use std::collections::HashMap;

use async_trait::async_trait;
use meld_core::{ChipUid, DeviceId, Did, Timestamp};
use meld_crypto::{did_matches_key, Ed25519PublicKey, IdentityRecord};
use parking_lot::RwLock;

use crate::backend::{BackendKind, KeyRegistry};
use crate::error::RegistryError;

/// A registered public key and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredKey {
    pub chip_uid: ChipUid,
    pub public_key: Ed25519PublicKey,
    pub device_id: DeviceId,
    pub did: Did,
    pub registered_at: Timestamp,
}

/// Thread-safe in-memory key registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<ChipUid, RegisteredKey>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key. `did` must be the did:key of `public_key`.
    pub fn put(&self, entry: RegisteredKey) -> Result<(), RegistryError> {
        if !did_matches_key(&entry.did, &entry.public_key) {
            return Err(RegistryError::Integrity(format!(
                "DID {} does not match public key",
                entry.did
            )));
        }
        let mut entries = self.entries.write();
        match entries.get(&entry.chip_uid) {
            Some(existing) if existing.registered_at > entry.registered_at => {
                tracing::debug!(chip_uid = %entry.chip_uid, "ignoring registration older than current entry");
            }
            _ => {
                entries.insert(entry.chip_uid.clone(), entry);
            }
        }
        Ok(())
    }

    pub fn get(&self, chip_uid: &ChipUid) -> Option<RegisteredKey> {
        self.entries.read().get(chip_uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyRegistry for MemoryRegistry {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn register_identity(&self, record: &IdentityRecord) -> Result<String, RegistryError> {
        record
            .verify()
            .map_err(|e| RegistryError::Integrity(e.to_string()))?;
        self.put(RegisteredKey {
            chip_uid: record.chip_uid.clone(),
            public_key: record.public_key,
            device_id: record.device_id.clone(),
            did: record.did.clone(),
            registered_at: record.registered_at,
        })?;
        Ok(record.chip_uid.to_string())
    }

    async fn lookup_public_key(
        &self,
        chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError> {
        Ok(self.get(chip_uid).map(|entry| entry.public_key))
    }
}
