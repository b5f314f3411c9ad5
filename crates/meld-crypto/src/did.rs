//! # did:key for Ed25519
//!
//! `did:key:z<base58btc(0xed 0x01 || public key)>`. The two-byte prefix is
//! the unsigned-varint multicodec for `ed25519-pub`; the leading `z` is the
//! multibase tag for base58btc. Every Ed25519 did:key therefore starts with
//! `did:key:z6Mk`.

use meld_core::{Did, ValidationError};

use crate::ed25519::Ed25519PublicKey;

const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Derive the `did:key` identifier for a public key.
pub fn did_key(public_key: &Ed25519PublicKey) -> Did {
    let mut buf = Vec::with_capacity(34);
    buf.extend_from_slice(&ED25519_MULTICODEC);
    buf.extend_from_slice(public_key.as_bytes());
    Did::key(&format!("z{}", bs58::encode(buf).into_string()))
}

/// Recover the Ed25519 public key from a `did:key` identifier.
pub fn public_key_from_did(did: &Did) -> Result<Ed25519PublicKey, ValidationError> {
    if did.method() != "key" {
        return Err(ValidationError::Did(format!(
            "expected did:key, got did:{}",
            did.method()
        )));
    }
    let encoded = did
        .method_specific_id()
        .strip_prefix('z')
        .ok_or_else(|| ValidationError::Did("did:key must use base58btc (z) multibase".into()))?;
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| ValidationError::Did(format!("invalid base58: {e}")))?;
    let key = bytes
        .strip_prefix(&ED25519_MULTICODEC)
        .ok_or_else(|| ValidationError::Did("not an ed25519-pub multicodec key".into()))?;
    Ed25519PublicKey::from_slice(key)
}

/// Whether `did` is exactly the did:key of `public_key`.
pub fn did_matches_key(did: &Did, public_key: &Ed25519PublicKey) -> bool {
    public_key_from_did(did).map(|pk| pk == *public_key).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::Ed25519KeyPair;

    #[test]
    fn test_did_key_prefix() {
        let pk = Ed25519KeyPair::from_seed(&[3u8; 32]).public_key();
        let did = did_key(&pk);
        assert!(did.as_str().starts_with("did:key:z6Mk"), "{did}");
    }

    #[test]
    fn test_did_key_decodes_to_same_key() {
        let pk = Ed25519KeyPair::generate().public_key();
        let did = did_key(&pk);
        assert_eq!(public_key_from_did(&did).unwrap(), pk);
        assert!(did_matches_key(&did, &pk));
    }

    #[test]
    fn test_did_key_is_deterministic() {
        let pk = Ed25519KeyPair::from_seed(&[9u8; 32]).public_key();
        assert_eq!(did_key(&pk), did_key(&pk));
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let a = Ed25519KeyPair::from_seed(&[1u8; 32]).public_key();
        let b = Ed25519KeyPair::from_seed(&[2u8; 32]).public_key();
        assert!(!did_matches_key(&did_key(&a), &b));
    }

    #[test]
    fn test_non_key_methods_rejected() {
        let did = Did::new("did:web:example.com").unwrap();
        assert!(public_key_from_did(&did).is_err());
        let did = Did::new("did:key:f00ff").unwrap();
        assert!(public_key_from_did(&did).is_err());
        let did = Did::new("did:key:z0OIl").unwrap();
        assert!(public_key_from_did(&did).is_err());
    }
}
