//! # Challenge Authenticator
//!
//! Bearer side: [`ChallengeAuthenticator::prove_identity`] re-derives the
//! chip's signing key from `(chipUID, PIN)` and signs SHA-512 of the
//! challenge. It never touches the registry.
//!
//! Verifier side: [`ChallengeAuthenticator::authenticate`] consumes the
//! challenge, obtains a proof, resolves the *registered* public key
//! independently of the proof, and verifies the signature against that key.
//! The key carried in the proof or on the tag is never trusted.
//!
//! Wrong PINs and unregistered chips are outcomes, not errors. Only
//! malformed input (empty chip UID, short PIN, bad challenge context)
//! returns `Err`.

use std::sync::Arc;

use meld_core::{ChipUid, DeviceId, Did, Timestamp};
use meld_crypto::{
    did_key, enroll, verify_challenge, ChallengeDigest, Ed25519PublicKey, Ed25519Signature,
    Enrollment, IdentityDeriver,
};
use meld_registry::{KeySource, RegistrationReceipt, RegistryContext};
use serde::{Deserialize, Serialize};

use crate::challenge::{Challenge, NonceLedger};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::proof::SignatureProof;
use crate::state::{AuthAttempt, AuthState};

pub const ERR_INVALID_SIGNATURE: &str = "Invalid signature - wrong PIN or compromised chip";
pub const ERR_KEY_NOT_FOUND: &str = "Public key not found in registry";
pub const ERR_CHALLENGE_REJECTED: &str = "Challenge expired or already used";

/// Result of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<Did>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub state: AuthState,
    #[serde(skip)]
    pub key_source: Option<KeySource>,
}

impl AuthOutcome {
    fn failed(state: AuthState, error: &str) -> Self {
        Self {
            authenticated: false,
            did: None,
            session_token: None,
            error: Some(error.to_string()),
            state,
            key_source: None,
        }
    }
}

/// An issued challenge and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedChallenge {
    pub challenge: String,
    pub expires_at: Timestamp,
}

/// Issues challenges, produces proofs, and verifies them against the registry.
#[derive(Debug)]
pub struct ChallengeAuthenticator {
    config: AuthConfig,
    deriver: IdentityDeriver,
    ledger: NonceLedger,
    registry: Arc<RegistryContext>,
}

impl ChallengeAuthenticator {
    pub fn new(config: AuthConfig, registry: Arc<RegistryContext>) -> Self {
        Self {
            deriver: IdentityDeriver::new(config.min_pin_length),
            ledger: NonceLedger::new(config.challenge_window, config.ledger_capacity),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RegistryContext> {
        &self.registry
    }

    /// Issue a fresh single-use challenge.
    pub fn generate_challenge(&self, context: Option<&str>) -> Result<IssuedChallenge, AuthError> {
        let challenge = Challenge::generate(context)?;
        let expires_at = self.ledger.issue(&challenge);
        Ok(IssuedChallenge {
            challenge: challenge.to_string(),
            expires_at,
        })
    }

    /// Derive the chip's key and sign `challenge`.
    pub fn prove_identity(
        &self,
        chip_uid: &ChipUid,
        pin: &str,
        challenge: &str,
    ) -> Result<SignatureProof, AuthError> {
        let keypair = self.deriver.derive_keypair(chip_uid, pin)?;
        let signature = keypair.sign_challenge(&ChallengeDigest::of(challenge));
        Ok(SignatureProof {
            signature,
            public_key: keypair.public_key(),
            chip_uid: chip_uid.clone(),
            timestamp: Timestamp::now(),
        })
    }

    /// Check `signature` over `challenge` against `public_key`.
    pub fn verify(
        &self,
        chip_uid: &ChipUid,
        challenge: &str,
        signature: &Ed25519Signature,
        public_key: &Ed25519PublicKey,
    ) -> bool {
        let ok = verify_challenge(&ChallengeDigest::of(challenge), signature, public_key);
        if !ok {
            tracing::debug!(chip_uid = %chip_uid, "challenge signature did not verify");
        }
        ok
    }

    /// Enroll a chip with its PIN-dependent key and register it.
    pub async fn enroll(
        &self,
        chip_uid: &ChipUid,
        pin: &str,
        device_id: &DeviceId,
    ) -> Result<(Enrollment, RegistrationReceipt), AuthError> {
        let enrollment = enroll(&self.deriver, chip_uid, pin, device_id)?;
        let receipt = self.registry.register_identity(&enrollment.record).await?;
        tracing::info!(chip_uid = %chip_uid, did = %enrollment.identity.did, "chip enrolled");
        Ok((enrollment, receipt))
    }

    /// Authenticate the bearer of `chip_uid` holding `pin`.
    ///
    /// With `challenge = None` a fresh challenge is issued and consumed
    /// internally. A caller-supplied challenge must have been issued by
    /// [`Self::generate_challenge`] on this authenticator, unexpired and
    /// unused.
    pub async fn authenticate(
        &self,
        chip_uid: &ChipUid,
        pin: &str,
        challenge: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        self.deriver.check_pin(pin)?;
        let mut attempt = AuthAttempt::new(chip_uid.clone());

        let challenge = match challenge {
            Some(c) => {
                Challenge::parse(c)?;
                c.to_string()
            }
            None => self.generate_challenge(None)?.challenge,
        };
        if !self.ledger.consume(&challenge) {
            attempt.try_transition(AuthState::Rejected)?;
            tracing::warn!(chip_uid = %chip_uid, "challenge refused");
            return Ok(AuthOutcome::failed(attempt.state(), ERR_CHALLENGE_REJECTED));
        }

        let proof = self.prove_identity(chip_uid, pin, &challenge)?;
        attempt.try_transition(AuthState::ProofGenerated)?;
        self.conclude(attempt, &challenge, &proof.signature).await
    }

    /// Verify a signature produced elsewhere over a challenge this
    /// authenticator issued.
    ///
    /// The challenge is consumed first, so a replayed response is refused
    /// even if its signature is valid. The key is resolved from the
    /// registry; nothing in the request is trusted as key material.
    pub async fn verify_response(
        &self,
        chip_uid: &ChipUid,
        challenge: &str,
        signature: &Ed25519Signature,
    ) -> Result<AuthOutcome, AuthError> {
        Challenge::parse(challenge)?;
        let mut attempt = AuthAttempt::new(chip_uid.clone());
        if !self.ledger.consume(challenge) {
            attempt.try_transition(AuthState::Rejected)?;
            tracing::warn!(chip_uid = %chip_uid, "challenge refused");
            return Ok(AuthOutcome::failed(attempt.state(), ERR_CHALLENGE_REJECTED));
        }
        attempt.try_transition(AuthState::ProofGenerated)?;
        self.conclude(attempt, challenge, signature).await
    }

    /// Resolve the registered key and check the proof against it.
    async fn conclude(
        &self,
        mut attempt: AuthAttempt,
        challenge: &str,
        signature: &Ed25519Signature,
    ) -> Result<AuthOutcome, AuthError> {
        let chip_uid = attempt.chip_uid.clone();
        let Some(resolved) = self.registry.lookup_public_key(&chip_uid).await else {
            attempt.try_transition(AuthState::LookupFailed)?;
            tracing::info!(chip_uid = %chip_uid, "authentication failed: key not found");
            return Ok(AuthOutcome::failed(attempt.state(), ERR_KEY_NOT_FOUND));
        };
        attempt.try_transition(AuthState::KeyResolved)?;

        if !self.verify(&chip_uid, challenge, signature, &resolved.public_key) {
            attempt.try_transition(AuthState::Rejected)?;
            tracing::info!(chip_uid = %chip_uid, "authentication failed: signature mismatch");
            return Ok(AuthOutcome {
                key_source: Some(resolved.source),
                ..AuthOutcome::failed(attempt.state(), ERR_INVALID_SIGNATURE)
            });
        }
        attempt.try_transition(AuthState::Verified)?;

        let session_token = format!(
            "{}_{}_{}",
            self.config.session_prefix,
            chip_uid,
            Timestamp::now().epoch_millis()
        );
        tracing::info!(chip_uid = %chip_uid, source = ?resolved.source, "chip authenticated");
        Ok(AuthOutcome {
            authenticated: true,
            did: Some(did_key(&resolved.public_key)),
            session_token: Some(session_token),
            error: None,
            state: attempt.state(),
            key_source: Some(resolved.source),
        })
    }
}
