//! Registry error types.

use meld_core::ValidationError;
use meld_discovery::DiscoveryError;
use thiserror::Error;

/// Errors from registry backends and the registration policy.
///
/// Lookups surface only [`RegistryError::InvalidInput`] and
/// [`RegistryError::NotImplemented`]. Transport and API failures during a
/// lookup are logged and reported as "not found".
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A record or identifier was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// HTTP transport failure.
    #[error("HTTP error calling {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    /// The registry service returned a non-2xx status.
    #[error("registry {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The backend has no implementation for this operation.
    #[error("{backend} registry does not implement {operation}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    /// A record failed verification or a response carried inconsistent data.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// The peer-to-peer layer rejected the operation.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Client configuration was unusable.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Every configured backend failed to register the record.
    #[error("registration failed on every backend: {0}")]
    AllBackendsFailed(String),

    /// No backend is configured for this operation.
    #[error("no registry backend configured")]
    NoBackend,
}
