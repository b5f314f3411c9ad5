//! # Identity Subcommands
//!
//! `meld derive` and `meld enroll`. PINs are accepted from the flag or the
//! `MELD_PIN` environment variable and never echoed.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use meld_auth::{AuthConfig, ChallengeAuthenticator};
use meld_core::{ChipUid, DeviceId};
use meld_crypto::{did_key, IdentityDeriver, DEFAULT_MIN_PIN_LENGTH};
use meld_registry::{CentralizedRegistry, KeyRegistry, RegistryClientConfig, RegistryContext};
use serde::Serialize;
use url::Url;
use zeroize::Zeroizing;

/// Arguments for `meld derive`.
#[derive(Args, Debug)]
pub struct DeriveArgs {
    #[arg(long)]
    pub chip_uid: String,
    #[arg(long, env = "MELD_PIN", hide_env_values = true)]
    pub pin: String,
    #[arg(long, default_value_t = DEFAULT_MIN_PIN_LENGTH)]
    pub min_pin_length: usize,
}

/// Arguments for `meld enroll`.
#[derive(Args, Debug)]
pub struct EnrollArgs {
    #[arg(long)]
    pub chip_uid: String,
    #[arg(long, env = "MELD_PIN", hide_env_values = true)]
    pub pin: String,
    /// Identifier of the enrolling device.
    #[arg(long)]
    pub device_id: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Centralized registry connection flags shared by several subcommands.
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    #[arg(long, env = "MELD_REGISTRY_URL", default_value = "http://127.0.0.1:8080")]
    pub registry_url: Url,
    #[arg(long, env = "MELD_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,
    #[arg(long, env = "MELD_REGISTRY_TIMEOUT_SECS", default_value_t = 10)]
    pub registry_timeout_secs: u64,
}

impl RegistryArgs {
    pub fn client(&self) -> Result<CentralizedRegistry> {
        let mut config = RegistryClientConfig::new(self.registry_url.clone());
        config.api_token = self.registry_token.clone().map(Zeroizing::new);
        config.timeout_secs = self.registry_timeout_secs;
        CentralizedRegistry::new(config).context("failed to build registry client")
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DerivedIdentity {
    #[serde(rename = "chipUID")]
    chip_uid: ChipUid,
    public_key: String,
    did: String,
}

pub fn run_derive(args: DeriveArgs) -> Result<u8> {
    let pin = Zeroizing::new(args.pin);
    let chip_uid = ChipUid::new(&args.chip_uid).context("invalid chip UID")?;
    let public_key = IdentityDeriver::new(args.min_pin_length)
        .derive_public_key(&chip_uid, &pin)
        .context("key derivation failed")?;
    let out = DerivedIdentity {
        did: did_key(&public_key).to_string(),
        public_key: public_key.to_hex(),
        chip_uid,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(0)
}

pub async fn run_enroll(args: EnrollArgs) -> Result<u8> {
    let pin = Zeroizing::new(args.pin);
    let chip_uid = ChipUid::new(&args.chip_uid).context("invalid chip UID")?;
    let device_id = DeviceId::new(&args.device_id).context("invalid device ID")?;

    let centralized: Arc<dyn KeyRegistry> = Arc::new(args.registry.client()?);
    let context = RegistryContext::builder().centralized(centralized).build();
    let authenticator = ChallengeAuthenticator::new(AuthConfig::default(), Arc::new(context));

    let (enrollment, receipt) = authenticator
        .enroll(&chip_uid, &pin, &device_id)
        .await
        .with_context(|| format!("enrollment of {chip_uid} failed"))?;
    tracing::info!(chip_uid = %chip_uid, registered_as = ?receipt.identifier(), "enrolled");
    println!("{}", serde_json::to_string_pretty(&enrollment.record)?);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_prints_ok() {
        let args = DeriveArgs {
            chip_uid: "04:aa:bb".into(),
            pin: "1234".into(),
            min_pin_length: 4,
        };
        assert_eq!(run_derive(args).unwrap(), 0);
    }

    #[test]
    fn test_derive_rejects_short_pin() {
        let args = DeriveArgs {
            chip_uid: "04:AA:BB".into(),
            pin: "12".into(),
            min_pin_length: 4,
        };
        assert!(run_derive(args).is_err());
    }

    #[test]
    fn test_registry_args_carry_token() {
        let args = RegistryArgs {
            registry_url: "http://registry.local:8080".parse().unwrap(),
            registry_token: Some("secret".into()),
            registry_timeout_secs: 3,
        };
        let client = args.client().unwrap();
        assert_eq!(client.base_url().as_str(), "http://registry.local:8080/");
    }
}
