//! Signature proofs produced by the bearer side.

use meld_core::{ChipUid, Timestamp};
use meld_crypto::{Ed25519PublicKey, Ed25519Signature};
use serde::{Deserialize, Serialize};

/// Ed25519 signature over SHA-512 of a challenge, with the signer's key.
///
/// Exists only for the duration of one authentication call. The embedded
/// `public_key` is informational: verifiers check the signature against the
/// key resolved from the registry, never against this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProof {
    pub signature: Ed25519Signature,
    pub public_key: Ed25519PublicKey,
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    pub timestamp: Timestamp,
}

/// A bearer's answer to a challenge, as submitted to a remote verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    pub challenge: String,
    pub signature: Ed25519Signature,
}

impl SignatureProof {
    /// The submission form of this proof for `challenge`.
    pub fn into_response(self, challenge: impl Into<String>) -> ChallengeResponse {
        ChallengeResponse {
            chip_uid: self.chip_uid,
            challenge: challenge.into(),
            signature: self.signature,
        }
    }
}
