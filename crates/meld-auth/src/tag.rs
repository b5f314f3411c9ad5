//! # Tag Payload and Read Debouncing
//!
//! The structure read from an NFC tag is
//! `{chipUID, publicKey, deviceID, authURL, registryHash}`. The key on the
//! tag is only a locator hint; authentication always resolves the key from
//! the registry.
//!
//! Readers report the same tag many times while it stays in the field.
//! [`TagDebouncer`] collapses repeats of one UID inside a short window.

use std::time::{Duration, Instant};

use meld_core::{ChipUid, ContentDigest, DeviceId};
use meld_crypto::{did_key, ChipIdentity, Ed25519PublicKey};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Data stored on the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPayload {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    #[serde(rename = "publicKey")]
    pub public_key: Ed25519PublicKey,
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    #[serde(rename = "authURL")]
    pub auth_url: Url,
    #[serde(rename = "registryHash", default, skip_serializing_if = "Option::is_none")]
    pub registry_hash: Option<ContentDigest>,
}

impl TagPayload {
    /// The identity the tag claims, with its DID derived from the tag key.
    pub fn to_identity(&self) -> ChipIdentity {
        ChipIdentity {
            chip_uid: self.chip_uid.clone(),
            device_id: self.device_id.clone(),
            did: did_key(&self.public_key),
            public_key: self.public_key,
        }
    }
}

/// Suppresses repeated reads of the same tag.
#[derive(Debug)]
pub struct TagDebouncer {
    window: Duration,
    last: Option<(ChipUid, Instant)>,
}

impl Default for TagDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl TagDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Report a read at `now`. Returns `true` if it should be processed.
    pub fn observe(&mut self, chip_uid: &ChipUid, now: Instant) -> bool {
        let duplicate = matches!(
            &self.last,
            Some((uid, at)) if uid == chip_uid && now.saturating_duration_since(*at) < self.window
        );
        if !duplicate {
            self.last = Some((chip_uid.clone(), now));
        }
        !duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_crypto::IdentityDeriver;

    #[test]
    fn test_payload_wire_shape() {
        let chip = ChipUid::new("04:AA:BB").unwrap();
        let key = IdentityDeriver::default().derive_public_key_for_chip(&chip).unwrap();
        let payload = TagPayload {
            chip_uid: chip,
            public_key: key,
            device_id: DeviceId::new("node-a").unwrap(),
            auth_url: "https://auth.example/verify".parse().unwrap(),
            registry_hash: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["chipUID"], "04:AA:BB");
        assert_eq!(value["publicKey"], key.to_hex());
        assert_eq!(value["authURL"], "https://auth.example/verify");
        assert!(value.get("registryHash").is_none());
        let back: TagPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.to_identity().did, did_key(&key));
    }

    #[test]
    fn test_debouncer_suppresses_repeats_within_window() {
        let mut debouncer = TagDebouncer::new(Duration::from_secs(2));
        let a = ChipUid::new("04:01").unwrap();
        let b = ChipUid::new("04:02").unwrap();
        let t0 = Instant::now();
        assert!(debouncer.observe(&a, t0));
        assert!(!debouncer.observe(&a, t0 + Duration::from_millis(500)));
        assert!(debouncer.observe(&b, t0 + Duration::from_millis(600)));
        assert!(debouncer.observe(&a, t0 + Duration::from_millis(700)));
        assert!(debouncer.observe(&a, t0 + Duration::from_secs(3)));
    }
}
