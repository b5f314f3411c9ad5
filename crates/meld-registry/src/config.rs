//! Centralized registry client configuration.

use url::Url;
use zeroize::Zeroizing;

pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for [`crate::CentralizedRegistry`].
///
/// Custom `Debug` redacts `api_token`.
#[derive(Clone)]
pub struct RegistryClientConfig {
    /// Base URL of the registry service.
    pub base_url: Url,
    /// Optional bearer token.
    pub api_token: Option<Zeroizing<String>>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for RegistryClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RegistryClientConfig {
    /// Configuration for `base_url` with no token and the default timeout.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `MELD_REGISTRY_URL` (default: `http://127.0.0.1:8080`)
    /// - `MELD_REGISTRY_TOKEN` (optional)
    /// - `MELD_REGISTRY_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_url("MELD_REGISTRY_URL", DEFAULT_REGISTRY_URL)?,
            api_token: std::env::var("MELD_REGISTRY_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .map(Zeroizing::new),
            timeout_secs: std::env::var("MELD_REGISTRY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("registry token contains characters not allowed in a header")]
    InvalidToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let mut cfg = RegistryClientConfig::new("http://127.0.0.1:9000".parse().unwrap());
        cfg.api_token = Some(Zeroizing::new("super-secret".into()));
        let rendered = format!("{cfg:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_env_url_uses_default_when_var_absent() {
        let url = env_url("MELD_TEST_NONEXISTENT_VAR_4711", DEFAULT_REGISTRY_URL).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_env_url_rejects_invalid_url() {
        std::env::set_var("MELD_TEST_BAD_REGISTRY_URL", "not a url");
        let result = env_url("MELD_TEST_BAD_REGISTRY_URL", DEFAULT_REGISTRY_URL);
        std::env::remove_var("MELD_TEST_BAD_REGISTRY_URL");
        assert!(result.is_err());
    }
}
