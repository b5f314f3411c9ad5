//! # meld-crypto — Cryptographic Primitives
//!
//! - **Derivation**: HKDF-SHA512 from `(chipUID, PIN)` to a clamped Ed25519
//!   secret. No private key is ever stored.
//! - **Ed25519** challenge signing over SHA-512 digests, and record
//!   signing over `CanonicalBytes`.
//! - **did:key** encoding and decoding for Ed25519 public keys.
//! - **Identity records**: self-signed, content-addressed registry entries.
//!
//! ## Crate Policy
//!
//! - Depends only on `meld-core` internally.
//! - No mocking of cryptographic operations in tests.

pub mod derive;
pub mod did;
pub mod ed25519;
pub mod record;

pub use derive::{DerivedSecretKey, IdentityDeriver, DEFAULT_MIN_PIN_LENGTH};
pub use did::{did_key, did_matches_key, public_key_from_did};
pub use ed25519::{
    verify_challenge, ChallengeDigest, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature,
    PUBLIC_KEY_LENGTH,
};
pub use record::{enroll, ChipIdentity, Enrollment, IdentityRecord, RecordError};
