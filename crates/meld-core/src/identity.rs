//! # Identity Newtypes
//!
//! Validated identifiers for chips, devices and decentralized identities.
//! You cannot pass a `DeviceId` where a `ChipUid` is expected.
//!
//! ## Chip UID normalization
//!
//! NFC readers report UIDs as uppercase hex bytes joined by colons
//! (`04:AA:BB:CC:DD:EE:FF`). Because the UID is key-derivation input, two
//! spellings of the same UID must normalize to the same string: surrounding
//! whitespace is trimmed and ASCII letters are uppercased.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

/// Maximum accepted chip UID length after trimming.
pub const MAX_CHIP_UID_LEN: usize = 64;

/// Hardware identifier of an NFC tag.
///
/// Accepts ASCII letters, digits, `:`, `-` and `.`. Everything else is
/// rejected: the UID is used as a URL path segment, and `_` is the
/// session-token separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChipUid(String);

impl ChipUid {
    /// Validate and normalize a chip UID.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::ChipUid("chip UID must not be empty".into()));
        }
        if trimmed.len() > MAX_CHIP_UID_LEN {
            return Err(ValidationError::ChipUid(format!(
                "chip UID longer than {MAX_CHIP_UID_LEN} characters"
            )));
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '.')))
        {
            return Err(ValidationError::ChipUid(format!(
                "chip UID contains disallowed character {c:?}"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Format raw UID bytes the way the reader does: `04:AA:BB`.
    pub fn from_bytes(uid: &[u8]) -> Result<Self, ValidationError> {
        let formatted = uid
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        Self::new(formatted)
    }

    /// The normalized UID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChipUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ChipUid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for ChipUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of the node (reader device) a chip was enrolled on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate a device identifier: non-empty after trimming, no control
    /// characters.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::DeviceId("device ID must not be empty".into()));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(ValidationError::DeviceId(
                "device ID contains control characters".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The device identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// A Decentralized Identifier (`did:<method>:<id>`).
///
/// This type only checks the generic DID shape. `meld-crypto` constructs
/// `did:key` values from Ed25519 public keys and decodes them back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Validate a DID string: `did:` prefix, lowercase alphanumeric method,
    /// non-empty method-specific identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let s = raw.into();
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| ValidationError::Did(format!("missing did: prefix in {s:?}")))?;
        let (method, id) = rest
            .split_once(':')
            .ok_or_else(|| ValidationError::Did(format!("missing method separator in {s:?}")))?;
        if method.is_empty()
            || !method
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ValidationError::Did(format!("invalid method {method:?}")));
        }
        if id.is_empty() {
            return Err(ValidationError::Did("empty method-specific id".into()));
        }
        Ok(Self(s))
    }

    /// Build a `did:key` from a multibase-encoded key. `multibase` is produced
    /// by the key encoder and always starts with its multibase tag, so it is
    /// never empty.
    pub fn key(multibase: &str) -> Self {
        Self(format!("did:key:{multibase}"))
    }

    /// The DID method (`key` for `did:key:z...`).
    pub fn method(&self) -> &str {
        self.0[4..].split(':').next().unwrap_or_default()
    }

    /// The method-specific identifier.
    pub fn method_specific_id(&self) -> &str {
        self.0[4..].split_once(':').map(|(_, id)| id).unwrap_or_default()
    }

    /// The full DID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}
