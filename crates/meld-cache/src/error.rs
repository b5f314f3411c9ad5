//! Cache and storage error types.

use thiserror::Error;

/// Errors from the offline key cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A public key was not exactly 32 bytes.
    #[error("public key must be {expected} bytes, got {actual}")]
    Length {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A snapshot could not be encoded or decoded.
    #[error("cache snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A snapshot entry carried an unusable field.
    #[error("invalid cache snapshot entry: {0}")]
    InvalidEntry(String),

    /// The backing key/value store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from a [`crate::storage::KeyValueStore`].
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage keys are restricted to `[A-Za-z0-9._-]`, 1..=64 characters.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    /// Filesystem IO failed.
    #[error("storage io error for key {key:?}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Underlying error.
        source: std::io::Error,
    },
}
