//! # Authentication Subcommands
//!
//! `meld challenge --remote` fetches a single-use challenge from a meld
//! service, `meld prove` signs it, and `meld verify` submits the signature
//! back. Without `--remote`, `meld challenge` prints a locally generated
//! challenge that no service will accept, for use with `meld prove` only.
//!
//! `meld authenticate` runs the full flow locally against the configured
//! backends, optionally through a persisted offline cache:
//!
//! 1. restore the cache snapshot from `--cache-dir`
//! 2. authenticate (cache, then P2P if gateways are given, then centralized)
//! 3. persist the cache snapshot back
//!
//! With `--remote` it instead runs challenge, sign and verify against the
//! service at `--registry-url`.
//!
//! `authenticate` and `verify` exit 0 when authenticated and 1 when refused.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use meld_auth::{AuthConfig, AuthOutcome, Challenge, ChallengeAuthenticator, ChallengeResponse};
use meld_cache::{CacheConfig, OfflineKeyCache};
use meld_core::ChipUid;
use meld_crypto::{Ed25519Signature, IdentityDeriver};
use meld_discovery::{DiscoveryConfig, DiscoveryNode, LocalBus};
use meld_registry::{KeyRegistry, P2PRegistry, RegistryContext};
use url::Url;
use zeroize::Zeroizing;

use crate::identity::RegistryArgs;
use crate::remote::{sign_response, AuthServiceClient};

/// Arguments for `meld challenge`.
#[derive(Args, Debug)]
pub struct ChallengeArgs {
    /// Optional context bound into the challenge (e.g. a door identifier).
    #[arg(long)]
    pub context: Option<String>,
    /// Request the challenge from the service at `--registry-url`.
    #[arg(long)]
    pub remote: bool,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Arguments for `meld prove`.
#[derive(Args, Debug)]
pub struct ProveArgs {
    #[arg(long)]
    pub chip_uid: String,
    #[arg(long, env = "MELD_PIN", hide_env_values = true)]
    pub pin: String,
    #[arg(long)]
    pub challenge: String,
}

/// Arguments for `meld verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(long)]
    pub chip_uid: String,
    #[arg(long)]
    pub challenge: String,
    /// Hex-encoded signature printed by `meld prove`.
    #[arg(long)]
    pub signature: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Arguments for `meld authenticate`.
#[derive(Args, Debug)]
pub struct AuthenticateArgs {
    #[arg(long)]
    pub chip_uid: String,
    #[arg(long, env = "MELD_PIN", hide_env_values = true)]
    pub pin: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
    /// Skip the centralized registry.
    #[arg(long)]
    pub offline: bool,
    /// Directory holding the persisted offline key cache.
    #[arg(long, env = "MELD_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
    /// Content gateway to probe for identity records. Repeatable.
    #[arg(long = "gateway", env = "MELD_P2P_GATEWAYS", value_delimiter = ',')]
    pub gateways: Vec<Url>,
    /// Co-located node probed before the gateways.
    #[arg(long, env = "MELD_P2P_LOCAL_NODE")]
    pub local_node: Option<Url>,
    /// Let the service at `--registry-url` issue and verify the challenge.
    /// Cache and gateway flags are ignored.
    #[arg(long, conflicts_with = "offline")]
    pub remote: bool,
}

pub async fn run_challenge(args: ChallengeArgs) -> Result<u8> {
    if args.remote {
        let issued = AuthServiceClient::new(&args.registry)?
            .issue_challenge(args.context.as_deref())
            .await?;
        println!("{}", serde_json::to_string_pretty(&issued)?);
        return Ok(0);
    }
    let challenge = Challenge::generate(args.context.as_deref()).context("invalid challenge context")?;
    println!("{challenge}");
    Ok(0)
}

pub fn run_prove(args: ProveArgs) -> Result<u8> {
    let pin = Zeroizing::new(args.pin);
    let chip_uid = ChipUid::new(&args.chip_uid).context("invalid chip UID")?;
    let response = sign_response(&IdentityDeriver::default(), &chip_uid, &pin, &args.challenge)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(0)
}

pub async fn run_verify(args: VerifyArgs) -> Result<u8> {
    let response = ChallengeResponse {
        chip_uid: ChipUid::new(&args.chip_uid).context("invalid chip UID")?,
        challenge: args.challenge,
        signature: Ed25519Signature::from_hex(args.signature.trim())
            .context("invalid signature")?,
    };
    let outcome = AuthServiceClient::new(&args.registry)?
        .verify(&response)
        .await?;
    report(&outcome)
}

fn report(outcome: &AuthOutcome) -> Result<u8> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(if outcome.authenticated { 0 } else { 1 })
}

/// P2P backend probing HTTP sources only. A CLI process has no gossip
/// neighbours on its bus, so the broadcast step is given no time.
fn p2p_backend(gateways: Vec<Url>, local_node: Option<Url>) -> Result<Arc<dyn KeyRegistry>> {
    let config = DiscoveryConfig {
        gateways,
        local_node,
        broadcast_timeout: Duration::ZERO,
        ..DiscoveryConfig::default()
    };
    let node = DiscoveryNode::new(config, LocalBus::default()).context("failed to build discovery node")?;
    Ok(Arc::new(P2PRegistry::from_node(Arc::new(node))))
}

pub async fn run_authenticate(args: AuthenticateArgs) -> Result<u8> {
    let pin = Zeroizing::new(args.pin);
    let chip_uid = ChipUid::new(&args.chip_uid).context("invalid chip UID")?;

    if args.remote {
        let outcome = AuthServiceClient::new(&args.registry)?
            .authenticate(&IdentityDeriver::default(), &chip_uid, &pin)
            .await?;
        return report(&outcome);
    }

    let (store, cache) = match &args.cache_dir {
        Some(dir) => {
            let (store, cache) = crate::open_cache(dir)?;
            (Some(store), cache)
        }
        None => (None, OfflineKeyCache::new(CacheConfig::default())),
    };

    let mut builder = RegistryContext::builder().cache(cache);
    if !args.gateways.is_empty() || args.local_node.is_some() {
        builder = builder.p2p(p2p_backend(args.gateways, args.local_node)?);
    }
    if !args.offline {
        let centralized: Arc<dyn KeyRegistry> = Arc::new(args.registry.client()?);
        builder = builder.centralized(centralized);
    }
    let authenticator = ChallengeAuthenticator::new(AuthConfig::default(), Arc::new(builder.build()));

    let outcome = authenticator
        .authenticate(&chip_uid, &pin, None)
        .await
        .context("authentication could not be attempted")?;

    if let Some(store) = &store {
        let written = authenticator
            .registry()
            .with_cache(|cache| cache.persist(store, crate::CACHE_KEY))
            .context("failed to persist offline cache")?;
        tracing::debug!(entries = written, "offline cache persisted");
    }

    report(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meld_crypto::{Ed25519PublicKey, IdentityDeriver};

    fn args(cache_dir: PathBuf) -> AuthenticateArgs {
        AuthenticateArgs {
            chip_uid: "04:AA:BB:CC".into(),
            pin: "1234".into(),
            registry: RegistryArgs {
                registry_url: "http://127.0.0.1:9".parse().unwrap(),
                registry_token: None,
                registry_timeout_secs: 1,
            },
            offline: true,
            cache_dir: Some(cache_dir),
            gateways: Vec::new(),
            local_node: None,
            remote: false,
        }
    }

    fn seed_cache(dir: &std::path::Path, key: Ed25519PublicKey) {
        let (store, mut cache) = crate::open_cache(dir).unwrap();
        cache
            .insert(ChipUid::new("04:AA:BB:CC").unwrap(), key.as_bytes(), true)
            .unwrap();
        cache.persist(&store, crate::CACHE_KEY).unwrap();
    }

    fn service_args(url: &str) -> RegistryArgs {
        RegistryArgs {
            registry_url: url.parse().unwrap(),
            registry_token: None,
            registry_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_local_challenge_prints_ok() {
        let challenge = |context: &str| ChallengeArgs {
            context: Some(context.into()),
            remote: false,
            registry: service_args("http://127.0.0.1:9"),
        };
        assert_eq!(run_challenge(challenge("door-1")).await.unwrap(), 0);
        assert!(run_challenge(challenge("")).await.is_err());
    }

    #[test]
    fn test_prove_rejects_short_pin() {
        let args = ProveArgs {
            chip_uid: "04:AA".into(),
            pin: "12".into(),
            challenge: "meld:v1:x".into(),
        };
        assert!(run_prove(args).is_err());
    }

    /// Serve the HTTP API on an ephemeral port with fast gossip timeouts.
    async fn spawn_service() -> (String, tokio::task::JoinHandle<()>) {
        let config = DiscoveryConfig {
            broadcast_timeout: Duration::from_millis(50),
            ..DiscoveryConfig::default()
        };
        let node = DiscoveryNode::new(config, LocalBus::default()).unwrap();
        let state = meld_api::state::AppState::with_node(
            meld_api::state::ApiConfig::default(),
            AuthConfig::default(),
            Arc::new(node),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = meld_api::app(state);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_round_trip_against_service() {
        let (url, server) = spawn_service().await;
        let enroll = crate::identity::EnrollArgs {
            chip_uid: "04:AA:BB:CC".into(),
            pin: "1234".into(),
            device_id: "door-1".into(),
            registry: service_args(&url),
        };
        assert_eq!(crate::identity::run_enroll(enroll).await.unwrap(), 0);

        let mut remote = args(PathBuf::from("unused"));
        remote.offline = false;
        remote.remote = true;
        remote.registry = service_args(&url);
        assert_eq!(run_authenticate(remote).await.unwrap(), 0);

        let mut wrong_pin = args(PathBuf::from("unused"));
        wrong_pin.offline = false;
        wrong_pin.remote = true;
        wrong_pin.pin = "9999".into();
        wrong_pin.registry = service_args(&url);
        assert_eq!(run_authenticate(wrong_pin).await.unwrap(), 1);

        let client = AuthServiceClient::new(&service_args(&url)).unwrap();
        let issued = client.issue_challenge(None).await.unwrap();
        let signed = sign_response(
            &IdentityDeriver::default(),
            &ChipUid::new("04:AA:BB:CC").unwrap(),
            "1234",
            &issued.challenge,
        )
        .unwrap();
        let verify = |signature: String| VerifyArgs {
            chip_uid: "04:AA:BB:CC".into(),
            challenge: issued.challenge.clone(),
            signature,
            registry: service_args(&url),
        };
        assert_eq!(run_verify(verify(signed.signature.to_hex())).await.unwrap(), 0);
        assert_eq!(run_verify(verify(signed.signature.to_hex())).await.unwrap(), 1);

        server.abort();
    }

    #[tokio::test]
    async fn test_offline_authentication_from_persisted_cache() {
        let dir = tempfile::tempdir().unwrap();
        let key = IdentityDeriver::default()
            .derive_public_key(&ChipUid::new("04:AA:BB:CC").unwrap(), "1234")
            .unwrap();
        seed_cache(dir.path(), key);

        assert_eq!(run_authenticate(args(dir.path().to_path_buf())).await.unwrap(), 0);

        let mut wrong_pin = args(dir.path().to_path_buf());
        wrong_pin.pin = "9999".into();
        assert_eq!(run_authenticate(wrong_pin).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_without_cache_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run_authenticate(args(dir.path().to_path_buf())).await.unwrap(), 1);
        let (_, cache) = crate::open_cache(dir.path()).unwrap();
        assert!(cache.is_empty());
    }
}
