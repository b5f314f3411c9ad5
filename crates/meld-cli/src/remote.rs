//! # Remote Verification
//!
//! Client for a meld service's challenge endpoints, and the bearer-side
//! signing step that sits between them:
//!
//! ```text
//! POST /auth/challenge  →  sign locally with (chipUID, PIN)  →  POST /auth/verify
//! ```
//!
//! The service owns the nonce ledger, so a challenge fetched here is
//! accepted once and only by the service that issued it.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use meld_auth::{AuthOutcome, ChallengeResponse, IssuedChallenge};
use meld_core::ChipUid;
use meld_crypto::{ChallengeDigest, IdentityDeriver};
use url::Url;

use crate::identity::RegistryArgs;

/// Sign `challenge` with the key derived from `(chip_uid, pin)`.
pub fn sign_response(
    deriver: &IdentityDeriver,
    chip_uid: &ChipUid,
    pin: &str,
    challenge: &str,
) -> Result<ChallengeResponse> {
    let keypair = deriver
        .derive_keypair(chip_uid, pin)
        .context("key derivation failed")?;
    Ok(ChallengeResponse {
        chip_uid: chip_uid.clone(),
        challenge: challenge.to_string(),
        signature: keypair.sign_challenge(&ChallengeDigest::of(challenge)),
    })
}

/// HTTP client for `/auth/challenge` and `/auth/verify`.
#[derive(Debug, Clone)]
pub struct AuthServiceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl AuthServiceClient {
    pub fn new(args: &RegistryArgs) -> Result<Self> {
        if args.registry_url.cannot_be_a_base() {
            bail!("{} cannot be used as a service URL", args.registry_url);
        }
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &args.registry_token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .context("service token is not a valid header value")?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(args.registry_timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: args.registry_url.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("{} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Ask the service for a single-use challenge.
    pub async fn issue_challenge(&self, context: Option<&str>) -> Result<IssuedChallenge> {
        let url = self.url(&["auth", "challenge"])?;
        let mut request = self.http.post(url);
        if let Some(context) = context {
            request = request.query(&[("context", context)]);
        }
        let resp = request
            .send()
            .await
            .context("POST /auth/challenge failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("POST /auth/challenge returned {status}: {body}");
        }
        resp.json()
            .await
            .context("POST /auth/challenge returned an unreadable body")
    }

    /// Submit a signed response for verification.
    pub async fn verify(&self, response: &ChallengeResponse) -> Result<AuthOutcome> {
        let url = self.url(&["auth", "verify"])?;
        let resp = self
            .http
            .post(url)
            .json(response)
            .send()
            .await
            .context("POST /auth/verify failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("POST /auth/verify returned {status}: {body}");
        }
        resp.json()
            .await
            .context("POST /auth/verify returned an unreadable body")
    }

    /// Fetch a challenge, sign it, and have the service verify it.
    pub async fn authenticate(
        &self,
        deriver: &IdentityDeriver,
        chip_uid: &ChipUid,
        pin: &str,
    ) -> Result<AuthOutcome> {
        let issued = self.issue_challenge(None).await?;
        let response = sign_response(deriver, chip_uid, pin, &issued.challenge)?;
        self.verify(&response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(url: &str) -> RegistryArgs {
        RegistryArgs {
            registry_url: url.parse().unwrap(),
            registry_token: None,
            registry_timeout_secs: 2,
        }
    }

    #[test]
    fn test_sign_response_verifies_against_derived_key() {
        let deriver = IdentityDeriver::default();
        let chip = ChipUid::new("04:AA").unwrap();
        let response = sign_response(&deriver, &chip, "1234", "meld:v1:x").unwrap();
        let key = deriver.derive_public_key(&chip, "1234").unwrap();
        assert!(meld_crypto::verify_challenge(
            &ChallengeDigest::of("meld:v1:x"),
            &response.signature,
            &key
        ));
        assert!(sign_response(&deriver, &chip, "12", "meld:v1:x").is_err());
    }

    #[tokio::test]
    async fn test_issue_challenge_passes_context_under_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/node/auth/challenge"))
            .and(query_param("context", "door-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "challenge": "meld:v1:1:00000000000000000000000000000000:door-1",
                "expiresAt": "2026-01-01T00:00:00.000Z",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AuthServiceClient::new(&args(&format!("{}/node", server.uri()))).unwrap();
        let issued = client.issue_challenge(Some("door-1")).await.unwrap();
        assert!(issued.challenge.ends_with(":door-1"));
    }

    #[tokio::test]
    async fn test_verify_surfaces_service_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad challenge"))
            .mount(&server)
            .await;

        let client = AuthServiceClient::new(&args(&server.uri())).unwrap();
        let response = sign_response(
            &IdentityDeriver::default(),
            &ChipUid::new("04:AA").unwrap(),
            "1234",
            "nope",
        )
        .unwrap();
        let err = client.verify(&response).await.unwrap_err();
        assert!(err.to_string().contains("422"));
    }
}
