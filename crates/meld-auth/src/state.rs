//! # Authentication State Machine
//!
//! ```text
//! WAITING ──proof──▶ PROOF_GENERATED ──key──▶ KEY_RESOLVED ──▶ VERIFIED
//!    │                      │                      │
//!    └──▶ REJECTED          └──▶ LOOKUP_FAILED     └──▶ REJECTED
//! ```
//!
//! `VERIFIED`, `REJECTED` and `LOOKUP_FAILED` are terminal. There are no
//! implicit retries: a new attempt starts again from `WAITING`.

use meld_core::{ChipUid, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// State of a single authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthState {
    Waiting,
    ProofGenerated,
    KeyResolved,
    Verified,
    Rejected,
    LookupFailed,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::ProofGenerated => "PROOF_GENERATED",
            Self::KeyResolved => "KEY_RESOLVED",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
            Self::LookupFailed => "LOOKUP_FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::LookupFailed)
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTransition {
    pub from: AuthState,
    pub to: AuthState,
    pub at: Timestamp,
}

/// Runtime-checked progress of one authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthAttempt {
    pub chip_uid: ChipUid,
    state: AuthState,
    transitions: Vec<AuthTransition>,
}

impl AuthAttempt {
    pub fn new(chip_uid: ChipUid) -> Self {
        Self {
            chip_uid,
            state: AuthState::Waiting,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn transitions(&self) -> &[AuthTransition] {
        &self.transitions
    }

    /// Move to `to` if the state machine allows it.
    pub fn try_transition(&mut self, to: AuthState) -> Result<(), AuthError> {
        use AuthState::*;
        let valid = matches!(
            (self.state, to),
            (Waiting, ProofGenerated)
                | (Waiting, Rejected)
                | (ProofGenerated, KeyResolved)
                | (ProofGenerated, LookupFailed)
                | (KeyResolved, Verified)
                | (KeyResolved, Rejected)
        );
        if !valid {
            return Err(AuthError::InvalidTransition {
                from: self.state.name(),
                to: to.name(),
            });
        }
        tracing::trace!(chip_uid = %self.chip_uid, from = %self.state, to = %to, "auth state transition");
        self.transitions.push(AuthTransition {
            from: self.state,
            to,
            at: Timestamp::now(),
        });
        self.state = to;
        Ok(())
    }
}
