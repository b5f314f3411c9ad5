//! Discovery error types.

use meld_crypto::RecordError;
use thiserror::Error;

/// Errors surfaced by the discovery layer.
///
/// Lookups never return these: an unreachable peer or an unverifiable
/// record is logged and treated as "not found".
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Peer identifiers are 1..=128 ASCII graphic characters.
    #[error("invalid peer id {0:?}")]
    InvalidPeerId(String),

    /// A record offered for publication failed verification.
    #[error("record rejected: {0}")]
    Record(#[from] RecordError),

    /// A frame could not be encoded.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// The HTTP client could not be constructed.
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    /// An environment variable held an unusable value.
    #[error("invalid configuration for {var}: {reason}")]
    Config {
        /// Variable name.
        var: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// `start` was called on a node whose background task is running.
    #[error("discovery node already running")]
    AlreadyRunning,
}
