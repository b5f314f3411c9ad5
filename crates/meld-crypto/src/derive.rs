//! # Identity Derivation
//!
//! Re-derives a chip's signing key on demand from its hardware UID and the
//! bearer's PIN. The key is never persisted anywhere.
//!
//! ## Construction
//!
//! ```text
//! ikm  = "meld/identity/v1" || u32be(len uid) || uid || u32be(len pin) || pin
//! okm  = HKDF-SHA512(salt = SALT, ikm).expand(info = "ed25519-signing-key", 32)
//! key  = clamp(okm)   // clear bits 0..=2 and 255, set bit 254
//! ```
//!
//! The length prefixes keep `("04:A", "B1234")` and `("04:AB", "1234")` from
//! producing the same input keying material.
//!
//! The PIN-independent tag identifier uses the same construction with an
//! empty PIN slot and a distinct `info` label, so it can never collide with
//! a signing key.

use hkdf::Hkdf;
use meld_core::{ChipUid, CryptoError, MeldError, ValidationError};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::ed25519::{Ed25519KeyPair, Ed25519PublicKey};

/// Default minimum PIN length.
pub const DEFAULT_MIN_PIN_LENGTH: usize = 4;

const DOMAIN_TAG: &[u8] = b"meld/identity/v1";
const SALT: &[u8] = b"MELD-NFC-IDENTITY-SALT-v1";
const SIGNING_KEY_INFO: &[u8] = b"ed25519-signing-key";
const TAG_PLACEHOLDER_INFO: &[u8] = b"tag-placeholder-key";

/// A clamped 32-byte Ed25519 secret. Zeroized on drop; `Debug` is redacted.
pub struct DerivedSecretKey(Zeroizing<[u8; 32]>);

impl DerivedSecretKey {
    /// The clamped secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build the signing key pair for this secret.
    pub fn to_keypair(&self) -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed(&self.0)
    }
}

impl std::fmt::Debug for DerivedSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedSecretKey(<private>)")
    }
}

/// Deterministic key derivation from `(chipUID, PIN)`.
#[derive(Debug, Clone, Copy)]
pub struct IdentityDeriver {
    min_pin_length: usize,
}

impl Default for IdentityDeriver {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PIN_LENGTH)
    }
}

impl IdentityDeriver {
    /// A deriver enforcing the given minimum PIN length (in characters).
    pub fn new(min_pin_length: usize) -> Self {
        Self { min_pin_length }
    }

    /// The configured minimum PIN length.
    pub fn min_pin_length(&self) -> usize {
        self.min_pin_length
    }

    /// Check a PIN against the policy without deriving anything.
    pub fn check_pin(&self, pin: &str) -> Result<(), ValidationError> {
        if pin.chars().count() < self.min_pin_length {
            return Err(ValidationError::PinTooShort {
                min: self.min_pin_length,
            });
        }
        Ok(())
    }

    /// Derive the clamped signing secret for a chip and PIN.
    ///
    /// # Errors
    ///
    /// `ValidationError::PinTooShort` when the PIN is shorter than the
    /// configured minimum. An empty chip UID cannot reach this function:
    /// `ChipUid::new` already rejects it.
    pub fn derive_private_key(&self, chip_uid: &ChipUid, pin: &str) -> Result<DerivedSecretKey, MeldError> {
        self.check_pin(pin)?;
        expand_clamped(chip_uid, pin.as_bytes(), SIGNING_KEY_INFO).map(DerivedSecretKey)
    }

    /// Derive the signing key pair for a chip and PIN.
    pub fn derive_keypair(&self, chip_uid: &ChipUid, pin: &str) -> Result<Ed25519KeyPair, MeldError> {
        Ok(self.derive_private_key(chip_uid, pin)?.to_keypair())
    }

    /// Derive the PIN-dependent public key. This is the key published at
    /// enrollment and checked at authentication.
    pub fn derive_public_key(&self, chip_uid: &ChipUid, pin: &str) -> Result<Ed25519PublicKey, MeldError> {
        Ok(self.derive_keypair(chip_uid, pin)?.public_key())
    }

    /// Derive the PIN-independent placeholder identifier written to a tag.
    ///
    /// It is not the chip's authentication key; registries hold the
    /// PIN-dependent key from [`Self::derive_public_key`].
    pub fn derive_public_key_for_chip(&self, chip_uid: &ChipUid) -> Result<Ed25519PublicKey, MeldError> {
        let secret = expand_clamped(chip_uid, &[], TAG_PLACEHOLDER_INFO)?;
        Ok(Ed25519KeyPair::from_seed(&secret).public_key())
    }
}

fn expand_clamped(chip_uid: &ChipUid, pin: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; 32]>, MeldError> {
    let uid = chip_uid.as_str().as_bytes();
    let mut ikm = Zeroizing::new(Vec::with_capacity(DOMAIN_TAG.len() + 8 + uid.len() + pin.len()));
    ikm.extend_from_slice(DOMAIN_TAG);
    ikm.extend_from_slice(&(uid.len() as u32).to_be_bytes());
    ikm.extend_from_slice(uid);
    ikm.extend_from_slice(&(pin.len() as u32).to_be_bytes());
    ikm.extend_from_slice(pin);

    let hk = Hkdf::<Sha512>::new(Some(SALT), &ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(info, okm.as_mut_slice())
        .map_err(|e| CryptoError::KeyError(format!("HKDF expand failed: {e}")))?;
    clamp(&mut okm);
    Ok(okm)
}

/// Ed25519 scalar clamping.
fn clamp(key: &mut [u8; 32]) {
    key[0] &= 0b1111_1000;
    key[31] &= 0b0111_1111;
    key[31] |= 0b0100_0000;
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn uid_strategy() -> impl Strategy<Value = ChipUid> {
        prop::collection::vec(any::<u8>(), 4..10)
            .prop_map(|b| ChipUid::from_bytes(&b).unwrap())
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(uid in uid_strategy(), pin in "[0-9]{4,8}") {
            let d = IdentityDeriver::default();
            let a = d.derive_private_key(&uid, &pin).unwrap();
            let b = d.derive_private_key(&uid, &pin).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        /// Changing one PIN character flips roughly half of the output bits.
        #[test]
        fn single_character_change_decorrelates(
            uid in uid_strategy(),
            pin in "[0-9]{4,8}",
            idx in 0usize..4,
        ) {
            let d = IdentityDeriver::default();
            let mut other: Vec<char> = pin.chars().collect();
            other[idx] = if other[idx] == '0' { '1' } else { '0' };
            let other: String = other.into_iter().collect();

            let a = d.derive_private_key(&uid, &pin).unwrap();
            let b = d.derive_private_key(&uid, &other).unwrap();
            prop_assert_ne!(a.as_bytes(), b.as_bytes());

            // 251 free bits after clamping; an unrelated key differs in ~125.
            let differing: u32 = a
                .as_bytes()
                .iter()
                .zip(b.as_bytes())
                .map(|(x, y)| (x ^ y).count_ones())
                .sum();
            prop_assert!(differing > 60, "only {} bits differ", differing);
        }
    }
}
