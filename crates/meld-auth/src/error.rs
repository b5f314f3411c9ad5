//! Authentication error types.
//!
//! A failed verification or an unresolvable key is not an error: both are
//! reported in [`crate::AuthOutcome`]. Errors are reserved for malformed
//! input and for enrollment failures.

use meld_core::{MeldError, ValidationError};
use meld_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Chip UID, PIN, challenge or tag payload was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Key derivation or record construction failed.
    #[error(transparent)]
    Core(MeldError),

    /// Registration of an enrolled identity failed on every backend.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An authentication attempt tried to move between states out of order.
    #[error("invalid auth state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

impl From<MeldError> for AuthError {
    fn from(err: MeldError) -> Self {
        match err {
            MeldError::Validation(v) => Self::InvalidInput(v),
            other => Self::Core(other),
        }
    }
}
