//! # Error Types
//!
//! Structured error hierarchy shared by all MELD crates. Everything derives
//! `thiserror::Error`.
//!
//! Only malformed input is an error. A failed signature check is reported as
//! `false`, and a missing registry entry as `None`, by the crates above this
//! one.

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum MeldError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Content integrity violation.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed input supplied by a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The chip UID is empty or contains characters that are not allowed.
    #[error("invalid chip UID: {0}")]
    ChipUid(String),

    /// The device identifier is empty or malformed.
    #[error("invalid device ID: {0}")]
    DeviceId(String),

    /// The PIN does not satisfy the configured policy.
    #[error("PIN must be at least {min} characters")]
    PinTooShort {
        /// Configured minimum length.
        min: usize,
    },

    /// A DID string is malformed or does not match its key.
    #[error("invalid DID: {0}")]
    Did(String),

    /// A key or signature has the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    Length {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A timestamp could not be parsed or is out of range.
    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    /// A content digest is not valid hex.
    #[error("invalid content digest: {0}")]
    Digest(String),

    /// A challenge string is malformed.
    #[error("invalid challenge: {0}")]
    Challenge(String),
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key parsing or derivation failed.
    #[error("key error: {0}")]
    KeyError(String),

    /// Signature parsing failed.
    #[error("signature error: {0}")]
    SignatureError(String),

    /// Digest computation failed.
    #[error("digest error: {0}")]
    DigestError(String),
}
