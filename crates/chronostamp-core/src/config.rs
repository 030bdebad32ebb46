//! Service configuration.
//!
//! Configuration is loaded from a TOML file. The deployment environment
//! selects exactly one of two signer keys: the development key for
//! non-production deployments and the production key otherwise. Keys are
//! held as [`SecretString`] so they never appear in debug output or
//! serialized config dumps.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::signer::SignerConfig;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is missing or inconsistent.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Deployment environment. Selects which signer key is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Non-production deployment; uses the development signer key.
    #[default]
    Development,
    /// Production deployment; uses the production signer key.
    Production,
}

/// One environment's signer key material.
#[derive(Deserialize)]
pub struct SignerKeyConfig {
    /// Hex-encoded secp256k1 private key.
    pub private_key: SecretString,

    /// Checksummed address the key is expected to derive.
    ///
    /// Optional, but strongly recommended outside tests: with it set, a
    /// deployment with the wrong key fails at startup instead of issuing
    /// authorizations the contract will reject.
    pub expected_address: Option<String>,
}

impl std::fmt::Debug for SignerKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerKeyConfig")
            .field("expected_address", &self.expected_address)
            .finish_non_exhaustive()
    }
}

/// Top-level service configuration.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,

    /// Path to the ledger database.
    #[serde(default = "default_ledger_path")]
    pub ledger_db: PathBuf,

    /// HTTP listen address for the daemon.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// JSON-RPC endpoint for best-effort receipt verification.
    ///
    /// When absent, recorded claims are not verified against the chain.
    pub chain_rpc_url: Option<String>,

    /// Bound on a single receipt fetch, in milliseconds.
    pub receipt_timeout_ms: Option<u64>,

    /// Development signer key. Required when `environment = "development"`.
    pub development_signer: Option<SignerKeyConfig>,

    /// Production signer key. Required when `environment = "production"`.
    pub production_signer: Option<SignerKeyConfig>,
}

impl ServiceConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// signer key for the active environment is missing.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the active environment
    /// has no signer key configured.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the signer configuration for the active environment.
    ///
    /// Exactly one key is ever loaded; the inactive environment's key is
    /// ignored even when present.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the active environment's key is
    /// missing.
    pub fn signer_config(&self) -> Result<SignerConfig, ConfigError> {
        let (key, label) = match self.environment {
            Environment::Development => (&self.development_signer, "development_signer"),
            Environment::Production => (&self.production_signer, "production_signer"),
        };

        let key = key.as_ref().ok_or_else(|| {
            ConfigError::Validation(format!("missing [{label}] for the active environment"))
        })?;

        Ok(SignerConfig {
            private_key_hex: key.private_key.clone(),
            expected_address: key.expected_address.clone(),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Fail at load time, not at first request.
        self.signer_config().map(|_| ())
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("chronostamp.db")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn parses_minimal_development_config() {
        let config = ServiceConfig::from_toml(&format!(
            r#"
            [development_signer]
            private_key = "{DEV_KEY}"
            "#
        ))
        .unwrap();

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        let signer = config.signer_config().unwrap();
        assert_eq!(signer.private_key_hex.expose_secret(), DEV_KEY);
    }

    #[test]
    fn production_environment_selects_production_key() {
        let config = ServiceConfig::from_toml(&format!(
            r#"
            environment = "production"

            [development_signer]
            private_key = "0xdead"

            [production_signer]
            private_key = "{DEV_KEY}"
            expected_address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
            "#
        ))
        .unwrap();

        let signer = config.signer_config().unwrap();
        assert_eq!(signer.private_key_hex.expose_secret(), DEV_KEY);
        assert!(signer.expected_address.is_some());
    }

    #[test]
    fn missing_active_environment_key_fails_at_load() {
        let result = ServiceConfig::from_toml(
            r#"
            environment = "production"

            [development_signer]
            private_key = "0xdead"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn debug_output_never_contains_key_material() {
        let config = ServiceConfig::from_toml(&format!(
            r#"
            [development_signer]
            private_key = "{DEV_KEY}"
            "#
        ))
        .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains(&DEV_KEY[2..10]));
    }
}
