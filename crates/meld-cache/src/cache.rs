//! # Offline Key Cache
//!
//! Bounded map `chipUID -> {publicKey, did, cachedAt, verified}` that lets a
//! verifier authenticate chips it has resolved before without network
//! access.
//!
//! ## Invariants
//!
//! - `len() <= capacity()` after every operation.
//! - Eviction removes the entry with the oldest `cachedAt`. Re-inserting a
//!   chip refreshes its `cachedAt`; reads do not (insertion/update order,
//!   not access order).
//! - An entry older than the TTL reads as absent even while it is still
//!   resident. [`OfflineKeyCache::prune`] removes such entries physically.
//! - Only 32-byte keys are admitted.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use meld_core::{ChipUid, Did, Timestamp};
use meld_crypto::{did_key, Ed25519PublicKey, PUBLIC_KEY_LENGTH};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::storage::KeyValueStore;

/// Default maximum number of cached keys.
pub const DEFAULT_CAPACITY: usize = 1_000;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache sizing and freshness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub capacity: usize,
    /// Entries older than this read as absent.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
        }
    }
}

/// A resolved public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub chip_uid: ChipUid,
    pub public_key: Ed25519PublicKey,
    pub did: Did,
    pub cached_at: Timestamp,
    /// Whether the key came from a record whose self-signature was checked.
    pub verified: bool,
}

/// Compact snapshot form: `{chipUID, publicKey: [u8; 32], cachedAt: epoch-ms}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactEntry {
    #[serde(rename = "chipUID")]
    pub chip_uid: String,
    #[serde(rename = "publicKey")]
    pub public_key: Vec<u8>,
    #[serde(rename = "cachedAt")]
    pub cached_at: i64,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    order_key: (i64, u64),
}

/// Bounded, TTL'd public-key cache.
#[derive(Debug)]
pub struct OfflineKeyCache {
    config: CacheConfig,
    slots: HashMap<ChipUid, Slot>,
    // (cachedAt millis, insertion sequence) -> chip; first entry is evicted first.
    order: BTreeMap<(i64, u64), ChipUid>,
    next_seq: u64,
}

impl Default for OfflineKeyCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl OfflineKeyCache {
    /// Create an empty cache. A capacity of zero is raised to one.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config: CacheConfig {
                capacity: config.capacity.max(1),
                ..config
            },
            slots: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of resident entries, stale ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert or refresh a key, stamped with the current time.
    pub fn insert(
        &mut self,
        chip_uid: ChipUid,
        public_key: &[u8],
        verified: bool,
    ) -> Result<(), CacheError> {
        self.insert_at(chip_uid, public_key, verified, Timestamp::now())
    }

    /// Insert or refresh a key with an explicit `cachedAt`.
    ///
    /// An entry older than every resident entry in a full cache is evicted
    /// immediately.
    ///
    /// # Errors
    ///
    /// `CacheError::Length` if `public_key` is not exactly 32 bytes.
    pub fn insert_at(
        &mut self,
        chip_uid: ChipUid,
        public_key: &[u8],
        verified: bool,
        cached_at: Timestamp,
    ) -> Result<(), CacheError> {
        let public_key = Ed25519PublicKey::from_slice(public_key).map_err(|_| CacheError::Length {
            expected: PUBLIC_KEY_LENGTH,
            actual: public_key.len(),
        })?;

        if let Some(old) = self.slots.remove(&chip_uid) {
            self.order.remove(&old.order_key);
        }

        let order_key = (cached_at.epoch_millis(), self.next_seq);
        self.next_seq += 1;
        self.order.insert(order_key, chip_uid.clone());
        let entry = CacheEntry {
            did: did_key(&public_key),
            chip_uid: chip_uid.clone(),
            public_key,
            cached_at,
            verified,
        };
        self.slots.insert(chip_uid, Slot { entry, order_key });

        self.evict_to_capacity();
        Ok(())
    }

    fn evict_to_capacity(&mut self) {
        while self.slots.len() > self.config.capacity {
            let Some((_, victim)) = self.order.pop_first() else {
                break;
            };
            self.slots.remove(&victim);
            tracing::debug!(chip_uid = %victim, "evicted oldest cache entry");
        }
    }

    /// Fresh entry for `chip_uid`, or `None` if absent or stale.
    pub fn get(&self, chip_uid: &ChipUid) -> Option<&CacheEntry> {
        self.get_at(chip_uid, Timestamp::now())
    }

    /// As [`Self::get`], evaluating freshness at `now`.
    pub fn get_at(&self, chip_uid: &ChipUid, now: Timestamp) -> Option<&CacheEntry> {
        let entry = &self.slots.get(chip_uid)?.entry;
        self.is_fresh(entry, now).then_some(entry)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Timestamp) -> bool {
        entry.cached_at.elapsed_until(now) <= self.config.ttl
    }

    /// Whether an entry is physically resident, regardless of freshness.
    pub fn is_resident(&self, chip_uid: &ChipUid) -> bool {
        self.slots.contains_key(chip_uid)
    }

    /// Remove one entry. Returns whether it was resident.
    pub fn remove(&mut self, chip_uid: &ChipUid) -> bool {
        match self.slots.remove(chip_uid) {
            Some(slot) => {
                self.order.remove(&slot.order_key);
                true
            }
            None => false,
        }
    }

    /// Physically remove stale entries. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        self.prune_at(Timestamp::now())
    }

    /// As [`Self::prune`], evaluating freshness at `now`.
    pub fn prune_at(&mut self, now: Timestamp) -> usize {
        let stale: Vec<ChipUid> = self
            .slots
            .values()
            .filter(|slot| !self.is_fresh(&slot.entry, now))
            .map(|slot| slot.entry.chip_uid.clone())
            .collect();
        for chip in &stale {
            self.remove(chip);
        }
        if !stale.is_empty() {
            tracing::debug!(removed = stale.len(), "pruned stale cache entries");
        }
        stale.len()
    }

    /// Entries in eviction order (oldest `cachedAt` first), stale included.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order
            .values()
            .filter_map(|chip| self.slots.get(chip).map(|slot| &slot.entry))
    }

    /// Compact snapshot of every resident entry, oldest first.
    pub fn export(&self) -> Vec<CompactEntry> {
        self.entries()
            .map(|e| CompactEntry {
                chip_uid: e.chip_uid.to_string(),
                public_key: e.public_key.as_bytes().to_vec(),
                cached_at: e.cached_at.epoch_millis(),
            })
            .collect()
    }

    /// Load a compact snapshot. DIDs are regenerated from each key, and
    /// imported entries are marked unverified.
    ///
    /// An imported entry never replaces a resident entry with a newer or
    /// equal `cachedAt`. The whole snapshot is validated before anything is
    /// inserted. Returns the number of entries applied.
    pub fn import(&mut self, snapshot: &[CompactEntry]) -> Result<usize, CacheError> {
        let mut parsed = Vec::with_capacity(snapshot.len());
        for item in snapshot {
            let chip = ChipUid::new(&item.chip_uid)
                .map_err(|e| CacheError::InvalidEntry(e.to_string()))?;
            if item.public_key.len() != PUBLIC_KEY_LENGTH {
                return Err(CacheError::Length {
                    expected: PUBLIC_KEY_LENGTH,
                    actual: item.public_key.len(),
                });
            }
            let cached_at = Timestamp::from_epoch_millis(item.cached_at)
                .map_err(|e| CacheError::InvalidEntry(e.to_string()))?;
            parsed.push((chip, item.public_key.as_slice(), cached_at));
        }
        parsed.sort_by_key(|(_, _, at)| *at);

        let mut applied = 0;
        for (chip, key, cached_at) in parsed {
            let newer_resident = self
                .slots
                .get(&chip)
                .is_some_and(|slot| slot.entry.cached_at >= cached_at);
            if newer_resident {
                continue;
            }
            self.insert_at(chip, key, false, cached_at)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Write the snapshot as JSON under `key`.
    pub fn persist(&self, store: &dyn KeyValueStore, key: &str) -> Result<usize, CacheError> {
        let snapshot = self.export();
        store.save(key, &serde_json::to_vec(&snapshot)?)?;
        Ok(snapshot.len())
    }

    /// Import the JSON snapshot stored under `key`, if any.
    pub fn restore(&mut self, store: &dyn KeyValueStore, key: &str) -> Result<usize, CacheError> {
        match store.load(key)? {
            Some(bytes) => {
                let snapshot: Vec<CompactEntry> = serde_json::from_slice(&bytes)?;
                self.import(&snapshot)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use meld_crypto::Ed25519KeyPair;

    fn chip(n: u32) -> ChipUid {
        ChipUid::from_bytes(&n.to_be_bytes()).unwrap()
    }

    fn key(n: u8) -> Vec<u8> {
        Ed25519KeyPair::from_seed(&[n; 32]).public_key().as_bytes().to_vec()
    }

    fn base() -> Timestamp {
        Timestamp::parse("2026-05-01T00:00:00Z").unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = OfflineKeyCache::default();
        cache.insert(chip(1), &key(1), true).unwrap();
        let entry = cache.get(&chip(1)).unwrap();
        assert_eq!(entry.public_key.as_bytes().to_vec(), key(1));
        assert_eq!(entry.did, did_key(&entry.public_key));
        assert!(entry.verified);
        assert!(cache.get(&chip(2)).is_none());
    }

    #[test]
    fn test_rejects_wrong_key_length() {
        let mut cache = OfflineKeyCache::default();
        for len in [0usize, 31, 33, 64] {
            let err = cache.insert(chip(1), &vec![0u8; len], true).unwrap_err();
            assert!(
                matches!(err, CacheError::Length { expected: 32, actual } if actual == len),
                "len {len}"
            );
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_bound_keeps_most_recent() {
        let mut cache = OfflineKeyCache::new(CacheConfig {
            capacity: 3,
            ..CacheConfig::default()
        });
        for n in 0..5u32 {
            let at = base().plus(Duration::from_secs(n as u64));
            cache.insert_at(chip(n), &key(n as u8), true, at).unwrap();
        }
        assert_eq!(cache.len(), 3);
        let resident: Vec<_> = cache.entries().map(|e| e.chip_uid.clone()).collect();
        assert_eq!(resident, vec![chip(2), chip(3), chip(4)]);
    }

    #[test]
    fn test_update_refreshes_eviction_order() {
        let mut cache = OfflineKeyCache::new(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        cache.insert_at(chip(1), &key(1), true, base()).unwrap();
        cache
            .insert_at(chip(2), &key(2), true, base().plus(Duration::from_secs(1)))
            .unwrap();
        // Refresh chip 1, so chip 2 becomes the oldest.
        cache
            .insert_at(chip(1), &key(1), true, base().plus(Duration::from_secs(2)))
            .unwrap();
        cache
            .insert_at(chip(3), &key(3), true, base().plus(Duration::from_secs(3)))
            .unwrap();
        assert!(cache.is_resident(&chip(1)));
        assert!(!cache.is_resident(&chip(2)));
        assert!(cache.is_resident(&chip(3)));
    }

    #[test]
    fn test_reads_do_not_refresh_order() {
        let mut cache = OfflineKeyCache::new(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        let now = Timestamp::now();
        cache.insert_at(chip(1), &key(1), true, now).unwrap();
        cache
            .insert_at(chip(2), &key(2), true, now.plus(Duration::from_millis(5)))
            .unwrap();
        assert!(cache.get_at(&chip(1), now).is_some());
        cache
            .insert_at(chip(3), &key(3), true, now.plus(Duration::from_millis(10)))
            .unwrap();
        assert!(!cache.is_resident(&chip(1)));
    }

    #[test]
    fn test_stale_entry_reads_absent_but_stays_resident() {
        let mut cache = OfflineKeyCache::default();
        let now = Timestamp::now();
        let old = now.minus(Duration::from_secs(25 * 60 * 60));
        cache.insert_at(chip(1), &key(1), true, old).unwrap();
        assert!(cache.get_at(&chip(1), now).is_none());
        assert!(cache.get(&chip(1)).is_none());
        assert!(cache.is_resident(&chip(1)));
        assert_eq!(cache.prune_at(now), 1);
        assert!(!cache.is_resident(&chip(1)));
    }

    #[test]
    fn test_entry_within_ttl_is_fresh() {
        let mut cache = OfflineKeyCache::default();
        let now = Timestamp::now();
        cache
            .insert_at(chip(1), &key(1), true, now.minus(Duration::from_secs(23 * 60 * 60)))
            .unwrap();
        assert!(cache.get_at(&chip(1), now).is_some());
        assert_eq!(cache.prune_at(now), 0);
    }

    #[test]
    fn test_export_import_reproduces_lookups() {
        let mut cache = OfflineKeyCache::default();
        let now = Timestamp::now();
        cache.insert_at(chip(1), &key(1), true, now).unwrap();
        cache
            .insert_at(chip(2), &key(2), true, now.minus(Duration::from_secs(30 * 60 * 60)))
            .unwrap();
        let snapshot = cache.export();
        assert_eq!(snapshot.len(), 2);

        let mut restored = OfflineKeyCache::default();
        assert_eq!(restored.import(&snapshot).unwrap(), 2);
        for n in [1, 2] {
            assert_eq!(
                restored.get_at(&chip(n), now).map(|e| (&e.public_key, &e.did)),
                cache.get_at(&chip(n), now).map(|e| (&e.public_key, &e.did)),
            );
        }
        assert!(restored.entries().all(|e| !e.verified));
    }

    #[test]
    fn test_import_does_not_clobber_newer_entry() {
        let mut cache = OfflineKeyCache::default();
        cache
            .insert_at(chip(1), &key(1), true, base().plus(Duration::from_secs(10)))
            .unwrap();
        let stale = vec![CompactEntry {
            chip_uid: chip(1).to_string(),
            public_key: key(9),
            cached_at: base().epoch_millis(),
        }];
        assert_eq!(cache.import(&stale).unwrap(), 0);
        assert_eq!(cache.entries().next().unwrap().public_key.as_bytes().to_vec(), key(1));
    }

    #[test]
    fn test_import_rejects_bad_snapshot_atomically() {
        let mut cache = OfflineKeyCache::default();
        let snapshot = vec![
            CompactEntry {
                chip_uid: "04:01".into(),
                public_key: key(1),
                cached_at: base().epoch_millis(),
            },
            CompactEntry {
                chip_uid: "04:02".into(),
                public_key: vec![1, 2, 3],
                cached_at: base().epoch_millis(),
            },
        ];
        assert!(matches!(
            cache.import(&snapshot),
            Err(CacheError::Length { actual: 3, .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compact_json_shape() {
        let mut cache = OfflineKeyCache::default();
        cache.insert_at(chip(1), &key(1), true, base()).unwrap();
        let json = serde_json::to_value(cache.export()).unwrap();
        let first = &json[0];
        assert_eq!(first["chipUID"], "00:00:00:01");
        assert_eq!(first["publicKey"].as_array().unwrap().len(), 32);
        assert_eq!(first["cachedAt"], base().epoch_millis());
    }

    #[test]
    fn test_persist_and_restore() {
        let store = MemoryStore::new();
        let mut cache = OfflineKeyCache::default();
        cache.insert(chip(7), &key(7), true).unwrap();
        assert_eq!(cache.persist(&store, "offline-keys").unwrap(), 1);

        let mut restored = OfflineKeyCache::default();
        assert_eq!(restored.restore(&store, "offline-keys").unwrap(), 1);
        assert!(restored.get(&chip(7)).is_some());
        assert_eq!(restored.restore(&store, "missing").unwrap(), 0);
    }
}
