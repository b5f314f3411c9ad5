//! # Record Store
//!
//! Content-addressed storage for verified identity records. Each record is
//! kept under its `contentHash`; a per-chip index points at the current
//! record, chosen by newest `registeredAt`.
//!
//! Records are verified on insert. Nothing unverified is ever stored, so
//! anything read back can be served to peers as-is.
//!
//! Besides content hashes, every chip has a deterministic *locator hash*
//! ([`locator_hash`]). Nodes answer `GET {endpoint}{locator}` with the chip's
//! current record, which lets a requester probe gateways without first
//! learning a content hash.
//!
//! Announcement hints are unverified, so they are bounded: each chip keeps
//! its [`MAX_HINTS_PER_CHIP`] newest hashes, and at most [`MAX_HINTED_CHIPS`]
//! chips are tracked, least recently hinted evicted first.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use meld_core::{sha256_digest, CanonicalBytes, CanonicalizationError, ChipUid, ContentDigest};
use meld_crypto::{IdentityRecord, RecordError};
use serde::Serialize;

const LOCATOR_KIND: &str = "meld-locator/v1";

/// Announced hashes kept per chip.
pub const MAX_HINTS_PER_CHIP: usize = 4;
/// Chips with announcement hints kept at once.
pub const MAX_HINTED_CHIPS: usize = 1024;

#[derive(Debug)]
struct Hints {
    seq: u64,
    /// Newest first.
    hashes: VecDeque<ContentDigest>,
}

#[derive(Serialize)]
struct Locator<'a> {
    #[serde(rename = "chipUID")]
    chip_uid: &'a ChipUid,
    kind: &'static str,
}

/// Deterministic lookup address for a chip's current record.
pub fn locator_hash(chip_uid: &ChipUid) -> Result<ContentDigest, CanonicalizationError> {
    Ok(sha256_digest(&CanonicalBytes::new(&Locator {
        chip_uid,
        kind: LOCATOR_KIND,
    })?))
}

/// Whether `record` is an acceptable answer to a request for `requested`.
///
/// The record must verify, and `requested` must be either its content hash
/// or the locator hash of its chip.
pub fn answers(record: &IdentityRecord, requested: &ContentDigest) -> bool {
    if !record.is_authentic() {
        return false;
    }
    if record.content_hash == *requested {
        return true;
    }
    matches!(locator_hash(&record.chip_uid), Ok(locator) if locator == *requested)
}

/// Verified records by content hash, plus a chip index and announcement hints.
#[derive(Debug, Default)]
pub struct RecordStore {
    by_hash: HashMap<ContentDigest, IdentityRecord>,
    current: HashMap<ChipUid, ContentDigest>,
    locators: HashMap<ContentDigest, ChipUid>,
    hints: HashMap<ChipUid, Hints>,
    hint_order: BTreeMap<u64, ChipUid>,
    next_seq: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify and store `record`. Returns its content hash.
    ///
    /// The chip's current pointer moves only if `record` is newer than the
    /// record it points at.
    pub fn insert(&mut self, record: IdentityRecord) -> Result<ContentDigest, RecordError> {
        record.verify()?;
        let hash = record.content_hash;
        let chip = record.chip_uid.clone();
        let replace = match self.current.get(&chip).and_then(|h| self.by_hash.get(h)) {
            Some(existing) => record.supersedes(existing),
            None => true,
        };
        if replace {
            self.current.insert(chip.clone(), hash);
        }
        let locator = locator_hash(&chip)?;
        self.locators.insert(locator, chip.clone());
        self.by_hash.insert(hash, record);
        self.hint(chip, hash);
        Ok(hash)
    }

    /// Record that `hash` was announced for `chip_uid`.
    pub fn hint(&mut self, chip_uid: ChipUid, hash: ContentDigest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = self.hints.entry(chip_uid.clone()).or_insert_with(|| Hints {
            seq,
            hashes: VecDeque::new(),
        });
        self.hint_order.remove(&entry.seq);
        entry.seq = seq;
        entry.hashes.retain(|h| *h != hash);
        entry.hashes.push_front(hash);
        entry.hashes.truncate(MAX_HINTS_PER_CHIP);
        self.hint_order.insert(seq, chip_uid);

        while self.hints.len() > MAX_HINTED_CHIPS {
            let Some((_, evicted)) = self.hint_order.pop_first() else {
                break;
            };
            self.hints.remove(&evicted);
        }
    }

    /// Hashes known or announced for `chip_uid`, newest first.
    pub fn hints_for(&self, chip_uid: &ChipUid) -> Vec<ContentDigest> {
        self.hints
            .get(chip_uid)
            .map(|h| h.hashes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Resolve a content hash or a locator hash.
    pub fn get(&self, hash: &ContentDigest) -> Option<&IdentityRecord> {
        self.by_hash.get(hash).or_else(|| {
            self.locators
                .get(hash)
                .and_then(|chip| self.current_for(chip))
        })
    }

    /// The current record for `chip_uid`.
    pub fn current_for(&self, chip_uid: &ChipUid) -> Option<&IdentityRecord> {
        self.current
            .get(chip_uid)
            .and_then(|hash| self.by_hash.get(hash))
    }

    /// Content hashes of every stored record.
    pub fn known_hashes(&self) -> BTreeSet<ContentDigest> {
        self.by_hash.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_core::{DeviceId, Timestamp};
    use meld_crypto::{did_key, ChipIdentity, IdentityDeriver};

    fn record_at(uid: &str, pin: &str, millis: i64) -> IdentityRecord {
        let chip = ChipUid::new(uid).unwrap();
        let keypair = IdentityDeriver::default().derive_keypair(&chip, pin).unwrap();
        let public_key = keypair.public_key();
        let identity = ChipIdentity {
            chip_uid: chip,
            device_id: DeviceId::new("node-a").unwrap(),
            did: did_key(&public_key),
            public_key,
        };
        IdentityRecord::sign(
            &identity,
            Timestamp::from_epoch_millis(millis).unwrap(),
            &keypair,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_resolve_by_content_hash() {
        let mut store = RecordStore::new();
        let record = record_at("04:A1", "1234", 1_000);
        let hash = store.insert(record.clone()).unwrap();
        assert_eq!(hash, record.content_hash);
        assert_eq!(store.get(&hash), Some(&record));
        assert_eq!(store.current_for(&record.chip_uid), Some(&record));
        assert!(store.known_hashes().contains(&hash));
    }

    #[test]
    fn test_tampered_record_is_not_stored() {
        let mut store = RecordStore::new();
        let mut record = record_at("04:A1", "1234", 1_000);
        record.device_id = DeviceId::new("attacker").unwrap();
        assert!(store.insert(record).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_newest_registration_becomes_current() {
        let mut store = RecordStore::new();
        let newer = record_at("04:A1", "9999", 2_000);
        let older = record_at("04:A1", "1234", 1_000);
        store.insert(newer.clone()).unwrap();
        store.insert(older.clone()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.current_for(&newer.chip_uid), Some(&newer));
        assert_eq!(store.get(&older.content_hash), Some(&older));
    }

    #[test]
    fn test_locator_resolves_current_record() {
        let mut store = RecordStore::new();
        let record = record_at("04:B2", "1234", 1_000);
        store.insert(record.clone()).unwrap();
        let locator = locator_hash(&record.chip_uid).unwrap();
        assert_eq!(store.get(&locator), Some(&record));
        assert!(answers(&record, &locator));
        assert!(answers(&record, &record.content_hash));
        assert!(!answers(&record, &ContentDigest::from_bytes([0; 32])));
    }

    #[test]
    fn test_locator_is_deterministic_per_chip() {
        let a = ChipUid::new("04:a1").unwrap();
        let b = ChipUid::new("04:A1").unwrap();
        let c = ChipUid::new("04:A2").unwrap();
        assert_eq!(locator_hash(&a).unwrap(), locator_hash(&b).unwrap());
        assert_ne!(locator_hash(&a).unwrap(), locator_hash(&c).unwrap());
    }

    #[test]
    fn test_hints_accumulate() {
        let mut store = RecordStore::new();
        let chip = ChipUid::new("04:C3").unwrap();
        store.hint(chip.clone(), ContentDigest::from_bytes([7; 32]));
        store.hint(chip.clone(), ContentDigest::from_bytes([8; 32]));
        assert_eq!(store.hints_for(&chip).len(), 2);
        assert!(store.hints_for(&ChipUid::new("04:FF").unwrap()).is_empty());
    }

    #[test]
    fn test_hints_keep_newest_per_chip() {
        let mut store = RecordStore::new();
        let chip = ChipUid::new("04:C3").unwrap();
        for i in 0..40u8 {
            store.hint(chip.clone(), ContentDigest::from_bytes([i; 32]));
        }
        store.hint(chip.clone(), ContentDigest::from_bytes([39; 32]));
        let hints = store.hints_for(&chip);
        assert_eq!(hints.len(), MAX_HINTS_PER_CHIP);
        assert_eq!(hints[0], ContentDigest::from_bytes([39; 32]));
        assert_eq!(hints[1], ContentDigest::from_bytes([38; 32]));
    }

    #[test]
    fn test_hinted_chips_are_bounded() {
        let mut store = RecordStore::new();
        let first = ChipUid::new("04:00:00").unwrap();
        store.hint(first.clone(), ContentDigest::from_bytes([1; 32]));
        for i in 0..MAX_HINTED_CHIPS as u32 {
            let chip = ChipUid::from_bytes(&i.to_be_bytes()).unwrap();
            store.hint(chip, ContentDigest::from_bytes([2; 32]));
        }
        assert_eq!(store.hints.len(), MAX_HINTED_CHIPS);
        assert_eq!(store.hint_order.len(), MAX_HINTED_CHIPS);
        assert!(store.hints_for(&first).is_empty());
    }
}
