//! # Registry Context
//!
//! Owns the offline key cache and the configured backends, and applies the
//! registration and lookup policy.
//!
//! ## Registration
//!
//! Peer-to-peer first, then centralized. Both are attempted when both are
//! configured. Registration succeeds if at least one backend accepts the
//! record; a failure on the other is logged.
//!
//! ## Lookup
//!
//! Offline cache, then peer-to-peer, then centralized. The first key found
//! wins and is written back to the cache. Exhausting every source yields
//! `None`, a normal outcome. Backend errors during lookup are logged and
//! treated as misses.

use std::sync::Arc;

use meld_cache::{CacheConfig, OfflineKeyCache};
use meld_core::ChipUid;
use meld_crypto::{Ed25519PublicKey, IdentityRecord};
use parking_lot::Mutex;

use crate::backend::{BackendKind, KeyRegistry};
use crate::error::RegistryError;

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Cache,
    Backend(BackendKind),
}

/// A resolved public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKey {
    pub public_key: Ed25519PublicKey,
    pub source: KeySource,
}

/// Per-backend identifiers returned by a successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReceipt {
    /// Content hash assigned by the peer-to-peer backend.
    pub p2p: Option<String>,
    /// Identifier returned by the centralized backend.
    pub centralized: Option<String>,
}

impl RegistrationReceipt {
    /// The primary identifier: the content hash if P2P accepted the record,
    /// otherwise the centralized identifier.
    pub fn identifier(&self) -> Option<&str> {
        self.p2p.as_deref().or(self.centralized.as_deref())
    }
}

/// Explicitly constructed registry state; there is no global instance.
pub struct RegistryContext {
    cache: Mutex<OfflineKeyCache>,
    p2p: Option<Arc<dyn KeyRegistry>>,
    centralized: Option<Arc<dyn KeyRegistry>>,
}

impl std::fmt::Debug for RegistryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryContext")
            .field("cached_keys", &self.cache.lock().len())
            .field("p2p", &self.p2p.as_ref().map(|b| b.kind()))
            .field("centralized", &self.centralized.as_ref().map(|b| b.kind()))
            .finish()
    }
}

/// Builder for [`RegistryContext`].
#[derive(Default)]
pub struct RegistryContextBuilder {
    cache: Option<OfflineKeyCache>,
    p2p: Option<Arc<dyn KeyRegistry>>,
    centralized: Option<Arc<dyn KeyRegistry>>,
}

impl RegistryContextBuilder {
    /// Use an existing cache (e.g. one restored from storage).
    pub fn cache(mut self, cache: OfflineKeyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The backend consulted first.
    pub fn p2p(mut self, backend: Arc<dyn KeyRegistry>) -> Self {
        self.p2p = Some(backend);
        self
    }

    /// The backend of last resort.
    pub fn centralized(mut self, backend: Arc<dyn KeyRegistry>) -> Self {
        self.centralized = Some(backend);
        self
    }

    pub fn build(self) -> RegistryContext {
        RegistryContext {
            cache: Mutex::new(
                self.cache
                    .unwrap_or_else(|| OfflineKeyCache::new(CacheConfig::default())),
            ),
            p2p: self.p2p,
            centralized: self.centralized,
        }
    }
}

impl RegistryContext {
    pub fn builder() -> RegistryContextBuilder {
        RegistryContextBuilder::default()
    }

    fn backends(&self) -> impl Iterator<Item = &Arc<dyn KeyRegistry>> {
        self.p2p.iter().chain(self.centralized.iter())
    }

    /// Register `record` on every configured backend, P2P first.
    ///
    /// # Errors
    ///
    /// - `Integrity` if the record does not verify (no backend is contacted).
    /// - `NoBackend` if nothing is configured.
    /// - `AllBackendsFailed` if no backend accepted the record.
    pub async fn register_identity(
        &self,
        record: &IdentityRecord,
    ) -> Result<RegistrationReceipt, RegistryError> {
        record
            .verify()
            .map_err(|e| RegistryError::Integrity(e.to_string()))?;
        if self.p2p.is_none() && self.centralized.is_none() {
            return Err(RegistryError::NoBackend);
        }

        let mut receipt = RegistrationReceipt::default();
        let mut failures = Vec::new();

        if let Some(p2p) = &self.p2p {
            match p2p.register_identity(record).await {
                Ok(id) => {
                    tracing::info!(chip_uid = %record.chip_uid, backend = %p2p.kind(), id = %id, "identity registered");
                    receipt.p2p = Some(id);
                }
                Err(e) => {
                    tracing::warn!(chip_uid = %record.chip_uid, backend = %p2p.kind(), error = %e, "registration failed, falling back");
                    failures.push(format!("{}: {e}", p2p.kind()));
                }
            }
        }

        if let Some(centralized) = &self.centralized {
            match centralized.register_identity(record).await {
                Ok(id) => {
                    tracing::info!(chip_uid = %record.chip_uid, backend = %centralized.kind(), id = %id, "identity registered");
                    receipt.centralized = Some(id);
                }
                Err(e) => {
                    tracing::warn!(chip_uid = %record.chip_uid, backend = %centralized.kind(), error = %e, "registration failed");
                    failures.push(format!("{}: {e}", centralized.kind()));
                }
            }
        }

        if receipt.identifier().is_none() {
            return Err(RegistryError::AllBackendsFailed(failures.join("; ")));
        }
        Ok(receipt)
    }

    /// Resolve the registered public key for `chip_uid`.
    pub async fn lookup_public_key(&self, chip_uid: &ChipUid) -> Option<ResolvedKey> {
        let cached = self.cache.lock().get(chip_uid).map(|entry| entry.public_key);
        if let Some(public_key) = cached {
            tracing::debug!(chip_uid = %chip_uid, "resolved from offline cache");
            return Some(ResolvedKey {
                public_key,
                source: KeySource::Cache,
            });
        }

        for backend in self.backends() {
            match backend.lookup_public_key(chip_uid).await {
                Ok(Some(public_key)) => {
                    tracing::debug!(chip_uid = %chip_uid, backend = %backend.kind(), "resolved public key");
                    if let Err(e) = self.cache.lock().insert(
                        chip_uid.clone(),
                        public_key.as_bytes(),
                        backend.yields_verified_keys(),
                    ) {
                        tracing::warn!(chip_uid = %chip_uid, error = %e, "could not cache resolved key");
                    }
                    return Some(ResolvedKey {
                        public_key,
                        source: KeySource::Backend(backend.kind()),
                    });
                }
                Ok(None) => {
                    tracing::debug!(chip_uid = %chip_uid, backend = %backend.kind(), "not found");
                }
                Err(e) => {
                    tracing::warn!(chip_uid = %chip_uid, backend = %backend.kind(), error = %e, "lookup failed");
                }
            }
        }
        tracing::info!(chip_uid = %chip_uid, "public key not found in any registry");
        None
    }

    /// Run `f` with exclusive access to the offline cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut OfflineKeyCache) -> R) -> R {
        f(&mut self.cache.lock())
    }
}
