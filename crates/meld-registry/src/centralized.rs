//! # Centralized Registry Client
//!
//! HTTP backend and availability of last resort.
//!
//! | Method | Path | Body / Response |
//! |--------|------|-----------------|
//! | POST   | `/registry/register` | `{chipUID, publicKey: [u8], deviceID, did}` → 200 |
//! | GET    | `/registry/lookup/{chipUID}` | → `{success, publicKey: [u8]}` |
//!
//! `publicKey` travels as a JSON array of byte values.

use std::time::Duration;

use async_trait::async_trait;
use meld_core::{ChipUid, DeviceId, Did};
use meld_crypto::{Ed25519PublicKey, IdentityRecord};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{BackendKind, KeyRegistry};
use crate::config::{ConfigError, RegistryClientConfig};
use crate::error::RegistryError;
use crate::retry::retry_send;

/// `POST /registry/register` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
    #[serde(rename = "publicKey")]
    pub public_key: Vec<u8>,
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    pub did: Did,
}

impl From<&IdentityRecord> for RegisterRequest {
    fn from(record: &IdentityRecord) -> Self {
        Self {
            chip_uid: record.chip_uid.clone(),
            public_key: record.public_key.as_bytes().to_vec(),
            device_id: record.device_id.clone(),
            did: record.did.clone(),
        }
    }
}

/// `POST /registry/register` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(rename = "chipUID")]
    pub chip_uid: ChipUid,
}

/// `GET /registry/lookup/{chipUID}` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub success: bool,
    #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client for a centralized registry service.
#[derive(Debug, Clone)]
pub struct CentralizedRegistry {
    http: reqwest::Client,
    base_url: Url,
}

impl CentralizedRegistry {
    pub fn new(config: RegistryClientConfig) -> Result<Self, RegistryError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(
                "base_url".into(),
                format!("{} cannot carry a path", config.base_url),
            )
            .into());
        }
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|_| ConfigError::InvalidToken)?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::Transport {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ConfigError::InvalidUrl("base_url".into(), "cannot carry a path".into())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Register a record's public key. Strict: every failure is an `Err`.
    pub async fn register(&self, record: &IdentityRecord) -> Result<RegisterResponse, RegistryError> {
        record
            .verify()
            .map_err(|e| RegistryError::Integrity(e.to_string()))?;
        let endpoint = "POST /registry/register";
        let url = self.url(&["registry", "register"])?;
        let body = RegisterRequest::from(record);

        let resp = retry_send(|| self.http.post(url.clone()).json(&body).send())
            .await
            .map_err(|e| RegistryError::Transport {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                endpoint: endpoint.into(),
                status,
                body,
            });
        }

        resp.json().await.map_err(|e| RegistryError::Transport {
            endpoint: endpoint.into(),
            source: e,
        })
    }

    /// Fetch a chip's public key. Strict: transport and API failures are `Err`.
    ///
    /// 404 and `{"success": false}` both mean "not registered".
    pub async fn fetch_public_key(
        &self,
        chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError> {
        let endpoint = format!("GET /registry/lookup/{chip_uid}");
        let url = self.url(&["registry", "lookup", chip_uid.as_str()])?;

        let resp = retry_send(|| self.http.get(url.clone()).send())
            .await
            .map_err(|e| RegistryError::Transport {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::Api {
                endpoint,
                status,
                body,
            });
        }

        let body: LookupResponse = resp.json().await.map_err(|e| RegistryError::Transport {
            endpoint: endpoint.clone(),
            source: e,
        })?;
        match (body.success, body.public_key) {
            (true, Some(bytes)) => Ed25519PublicKey::from_slice(&bytes)
                .map(Some)
                .map_err(|e| RegistryError::Integrity(format!("{endpoint}: {e}"))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl KeyRegistry for CentralizedRegistry {
    fn kind(&self) -> BackendKind {
        BackendKind::Centralized
    }

    async fn register_identity(&self, record: &IdentityRecord) -> Result<String, RegistryError> {
        let resp = self.register(record).await?;
        Ok(resp.chip_uid.to_string())
    }

    async fn lookup_public_key(
        &self,
        chip_uid: &ChipUid,
    ) -> Result<Option<Ed25519PublicKey>, RegistryError> {
        match self.fetch_public_key(chip_uid).await {
            Ok(key) => Ok(key),
            Err(RegistryError::InvalidInput(e)) => Err(RegistryError::InvalidInput(e)),
            Err(e) => {
                tracing::warn!(chip_uid = %chip_uid, backend = "centralized", error = %e, "lookup failed, treating as not found");
                Ok(None)
            }
        }
    }
}
