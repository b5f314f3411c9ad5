//! # meld-auth — Challenge-Response Authentication
//!
//! A bearer proves possession of a chip and its PIN by signing a
//! single-use challenge with a key derived on demand from
//! `(chipUID, PIN)`. The verifier resolves the chip's registered key
//! through [`meld_registry::RegistryContext`] and checks the signature
//! against it.
//!
//! Outcomes carry one of three human-readable errors:
//!
//! - `"Invalid signature - wrong PIN or compromised chip"`
//! - `"Public key not found in registry"`
//! - `"Challenge expired or already used"`

pub mod authenticator;
pub mod challenge;
pub mod config;
pub mod error;
pub mod proof;
pub mod state;
pub mod tag;

pub use authenticator::{
    AuthOutcome, ChallengeAuthenticator, IssuedChallenge, ERR_CHALLENGE_REJECTED,
    ERR_INVALID_SIGNATURE, ERR_KEY_NOT_FOUND,
};
pub use challenge::{Challenge, NonceLedger};
pub use config::AuthConfig;
pub use error::AuthError;
pub use proof::{ChallengeResponse, SignatureProof};
pub use state::{AuthAttempt, AuthState, AuthTransition};
pub use tag::{TagDebouncer, TagPayload};
