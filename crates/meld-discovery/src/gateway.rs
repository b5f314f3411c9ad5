//! # Gateway Client
//!
//! Fetches records from HTTP endpoints that serve
//! `GET {base}{contentHash}`: public content gateways, the co-located node,
//! and peers that announced an endpoint.
//!
//! A fetch never fails loudly. Transport errors, non-200 responses,
//! undecodable bodies and records that do not answer the requested hash
//! all produce `None`; only a verified record is returned.

use std::time::Duration;

use meld_core::ContentDigest;
use meld_crypto::IdentityRecord;
use url::Url;

use crate::error::DiscoveryError;
use crate::store::answers;

/// HTTP fetcher for content-addressed identity records.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
}

impl GatewayClient {
    pub fn new() -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("meld-discovery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// `{base}{hash}`, tolerating a missing trailing slash on `base`.
    pub fn record_url(base: &Url, hash: &ContentDigest) -> String {
        format!("{}/{}", base.as_str().trim_end_matches('/'), hash)
    }

    /// Fetch and verify the record for `hash` from `base` within `timeout`.
    pub async fn fetch(
        &self,
        base: &Url,
        hash: &ContentDigest,
        timeout: Duration,
    ) -> Option<IdentityRecord> {
        let url = Self::record_url(base, hash);
        let resp = match self.http.get(&url).timeout(timeout).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "record fetch failed");
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(url = %url, status = %resp.status(), "record not served");
            return None;
        }
        let record: IdentityRecord = match resp.json().await {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "undecodable record body");
                return None;
            }
        };
        if !answers(&record, hash) {
            tracing::debug!(url = %url, "discarding record that does not verify against requested hash");
            return None;
        }
        Some(record)
    }
}
