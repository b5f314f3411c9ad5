//! Authenticator configuration.

use std::time::Duration;

use meld_crypto::DEFAULT_MIN_PIN_LENGTH;

pub const DEFAULT_SESSION_PREFIX: &str = "meld";
pub const DEFAULT_CHALLENGE_WINDOW: Duration = Duration::from_secs(120);
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Configuration for [`crate::ChallengeAuthenticator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// PINs shorter than this are rejected as invalid input.
    pub min_pin_length: usize,
    /// Session tokens are `<prefix>_<chipUID>_<timestamp>`.
    pub session_prefix: String,
    /// How long an issued challenge stays acceptable.
    pub challenge_window: Duration,
    /// Maximum outstanding challenges.
    pub ledger_capacity: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_pin_length: DEFAULT_MIN_PIN_LENGTH,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            challenge_window: DEFAULT_CHALLENGE_WINDOW,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
        }
    }
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `MELD_AUTH_MIN_PIN_LENGTH` (default: 4)
    /// - `MELD_AUTH_SESSION_PREFIX` (default: `meld`)
    /// - `MELD_AUTH_CHALLENGE_WINDOW_SECS` (default: 120)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_pin_length: std::env::var("MELD_AUTH_MIN_PIN_LENGTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_pin_length),
            session_prefix: std::env::var("MELD_AUTH_SESSION_PREFIX")
                .ok()
                .filter(|s| !s.is_empty() && !s.contains('_'))
                .unwrap_or(defaults.session_prefix),
            challenge_window: std::env::var("MELD_AUTH_CHALLENGE_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.challenge_window),
            ledger_capacity: defaults.ledger_capacity,
        }
    }
}
