//! # Identity Records
//!
//! An `IdentityRecord` binds a chip UID to its PIN-dependent public key and
//! is the unit stored by every registry backend.
//!
//! ## Security Invariant
//!
//! A record is trusted only if all of the following hold:
//!
//! 1. `signature` is a valid Ed25519 signature by `publicKey` over the
//!    canonical (sorted-key JCS) bytes of
//!    `{chipUID, deviceID, did, publicKey, registeredAt}`.
//! 2. `did` is the did:key of `publicKey`.
//! 3. `contentHash` equals SHA-256 of the canonical bytes of every other
//!    field, signature included.
//!
//! Mutating any single field after signing breaks at least one of these.
//! The same canonicalization runs at creation and at verification.

use meld_core::{
    sha256_digest, CanonicalBytes, CanonicalizationError, ChipUid, ContentDigest, DeviceId, Did,
    MeldError, Timestamp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::derive::IdentityDeriver;
use crate::did::{did_key, did_matches_key};
use crate::ed25519::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Reasons a record fails verification.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// `did` does not encode `publicKey`.
    #[error("DID {did} does not match public key")]
    DidMismatch {
        /// The DID carried by the record.
        did: String,
    },

    /// The self-signature does not verify.
    #[error("record signature invalid for chip {chip_uid}")]
    BadSignature {
        /// Chip the record claims to describe.
        chip_uid: String,
    },

    /// The stored content hash differs from the recomputed one.
    #[error("content hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Hash carried by the record.
        stored: ContentDigest,
        /// Hash recomputed from the record's fields.
        computed: ContentDigest,
    },
}

/// A chip's public identity, created once at enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipIdentity {
    /// Hardware UID.
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    /// Node the chip was enrolled on.
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    /// did:key of `public_key`.
    pub did: Did,
    /// PIN-dependent public key.
    #[serde(rename = "publicKey")]
    pub public_key: Ed25519PublicKey,
}

/// A self-signed, content-addressed registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Hardware UID.
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    /// PIN-dependent public key; also the key `signature` verifies under.
    #[serde(rename = "publicKey")]
    pub public_key: Ed25519PublicKey,
    /// Node the chip was enrolled on.
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    /// did:key of `public_key`.
    pub did: Did,
    /// Registration time. The newest record for a chip is its current one.
    #[serde(rename = "registeredAt")]
    pub registered_at: Timestamp,
    /// Signature over the JCS encoding of the fields above.
    pub signature: Ed25519Signature,
    /// SHA-256 of the JCS encoding of the fields above plus `signature`.
    #[serde(rename = "contentHash")]
    pub content_hash: ContentDigest,
}

#[derive(Serialize)]
struct SignedFields<'a> {
    #[serde(rename = "chipUID")]
    chip_uid: &'a ChipUid,
    #[serde(rename = "publicKey")]
    public_key: &'a Ed25519PublicKey,
    #[serde(rename = "deviceID")]
    device_id: &'a DeviceId,
    did: &'a Did,
    #[serde(rename = "registeredAt")]
    registered_at: &'a Timestamp,
}

#[derive(Serialize)]
struct HashedFields<'a> {
    #[serde(flatten)]
    signed: SignedFields<'a>,
    signature: &'a Ed25519Signature,
}

impl IdentityRecord {
    /// Build and self-sign a record for `identity` with `keypair`.
    ///
    /// The caller is responsible for `keypair` being the one whose public
    /// key is in `identity`; [`Self::verify`] rejects the record otherwise.
    pub fn sign(
        identity: &ChipIdentity,
        registered_at: Timestamp,
        keypair: &Ed25519KeyPair,
    ) -> Result<Self, CanonicalizationError> {
        let signed = SignedFields {
            chip_uid: &identity.chip_uid,
            public_key: &identity.public_key,
            device_id: &identity.device_id,
            did: &identity.did,
            registered_at: &registered_at,
        };
        let signature = keypair.sign(&CanonicalBytes::new(&signed)?);
        let content_hash = sha256_digest(&CanonicalBytes::new(&HashedFields {
            signed,
            signature: &signature,
        })?);
        Ok(Self {
            chip_uid: identity.chip_uid.clone(),
            public_key: identity.public_key,
            device_id: identity.device_id.clone(),
            did: identity.did.clone(),
            registered_at,
            signature,
            content_hash,
        })
    }

    fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            chip_uid: &self.chip_uid,
            public_key: &self.public_key,
            device_id: &self.device_id,
            did: &self.did,
            registered_at: &self.registered_at,
        }
    }

    /// Recompute the content hash from the record's fields.
    pub fn compute_content_hash(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(&HashedFields {
            signed: self.signed_fields(),
            signature: &self.signature,
        })?))
    }

    /// Check the self-signature, DID binding and content hash.
    pub fn verify(&self) -> Result<(), RecordError> {
        if !did_matches_key(&self.did, &self.public_key) {
            return Err(RecordError::DidMismatch {
                did: self.did.to_string(),
            });
        }
        let body = CanonicalBytes::new(&self.signed_fields())?;
        verify(&body, &self.signature, &self.public_key).map_err(|_| RecordError::BadSignature {
            chip_uid: self.chip_uid.to_string(),
        })?;
        let computed = self.compute_content_hash()?;
        if computed != self.content_hash {
            return Err(RecordError::HashMismatch {
                stored: self.content_hash,
                computed,
            });
        }
        Ok(())
    }

    /// `true` if [`Self::verify`] succeeds.
    pub fn is_authentic(&self) -> bool {
        self.verify().is_ok()
    }

    /// Whether this record should replace `other` as the current record
    /// for the same chip. Newest `registeredAt` wins.
    pub fn supersedes(&self, other: &IdentityRecord) -> bool {
        self.chip_uid == other.chip_uid && self.registered_at > other.registered_at
    }

    /// The public identity this record describes.
    pub fn identity(&self) -> ChipIdentity {
        ChipIdentity {
            chip_uid: self.chip_uid.clone(),
            device_id: self.device_id.clone(),
            did: self.did.clone(),
            public_key: self.public_key,
        }
    }
}

/// Output of enrollment: the public identity and its signed record.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub identity: ChipIdentity,
    pub record: IdentityRecord,
}

/// Enroll a chip: derive its PIN-dependent key pair, then build and sign the
/// identity record. The key pair is dropped (and zeroized) before returning.
pub fn enroll(
    deriver: &IdentityDeriver,
    chip_uid: &ChipUid,
    pin: &str,
    device_id: &DeviceId,
) -> Result<Enrollment, MeldError> {
    let keypair = deriver.derive_keypair(chip_uid, pin)?;
    let public_key = keypair.public_key();
    let identity = ChipIdentity {
        chip_uid: chip_uid.clone(),
        device_id: device_id.clone(),
        did: did_key(&public_key),
        public_key,
    };
    let record = IdentityRecord::sign(&identity, Timestamp::now(), &keypair)?;
    Ok(Enrollment { identity, record })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrolled() -> Enrollment {
        enroll(
            &IdentityDeriver::default(),
            &ChipUid::new("04:AA:BB:CC:DD:EE:FF").unwrap(),
            "1234",
            &DeviceId::new("meld-node-1").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_enrolled_record_verifies() {
        let e = enrolled();
        e.record.verify().expect("fresh record must verify");
        assert_eq!(e.record.identity(), e.identity);
    }

    #[test]
    fn test_enrollment_publishes_pin_dependent_key() {
        let e = enrolled();
        let d = IdentityDeriver::default();
        assert_eq!(
            e.identity.public_key,
            d.derive_public_key(&e.identity.chip_uid, "1234").unwrap()
        );
        assert_ne!(
            e.identity.public_key,
            d.derive_public_key_for_chip(&e.identity.chip_uid).unwrap()
        );
    }

    #[test]
    fn test_json_roundtrip_still_verifies() {
        let e = enrolled();
        let json = serde_json::to_string(&e.record).unwrap();
        assert!(json.contains("\"chipUID\""));
        assert!(json.contains("\"contentHash\""));
        let back: IdentityRecord = serde_json::from_str(&json).unwrap();
        back.verify().unwrap();
    }

    #[test]
    fn test_signature_by_other_key_rejected() {
        let e = enrolled();
        let other = Ed25519KeyPair::from_seed(&[5u8; 32]);
        let forged = IdentityRecord::sign(&e.identity, e.record.registered_at, &other).unwrap();
        assert!(matches!(forged.verify(), Err(RecordError::BadSignature { .. })));
    }

    #[test]
    fn test_tampered_content_hash_rejected() {
        let mut r = enrolled().record;
        r.content_hash = ContentDigest::from_bytes([0u8; 32]);
        assert!(matches!(r.verify(), Err(RecordError::HashMismatch { .. })));
    }

    #[test]
    fn test_supersedes_only_same_chip_and_newer() {
        let e = enrolled();
        let kp = IdentityDeriver::default()
            .derive_keypair(&e.identity.chip_uid, "1234")
            .unwrap();
        let later = e
            .record
            .registered_at
            .plus(std::time::Duration::from_secs(1));
        let newer = IdentityRecord::sign(&e.identity, later, &kp).unwrap();
        assert!(newer.supersedes(&e.record));
        assert!(!e.record.supersedes(&newer));
        assert!(!e.record.supersedes(&e.record));
    }
}
