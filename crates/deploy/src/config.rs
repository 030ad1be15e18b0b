//! Layered deployment configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, `Erc721n.toml`,
//! `ERC721N_*` environment variables (`__` separates nested keys), then the
//! Hardhat-style `SEPOLIA_RPC`, `MAINNET_RPC` and `PK` variables.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    DeployError, ExecutionContext, JsonRpcNetwork, ReserveToken, signer::Signer,
};

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "Erc721n.toml";

/// Prefix of the environment variables read by [`DeployConfig::figment`].
pub const ENV_PREFIX: &str = "ERC721N_";

pub const DEFAULT_NETWORK: &str = "sepolia";

/// Legacy variables and the configuration keys they set.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("SEPOLIA_RPC", "networks.sepolia.url"),
    ("MAINNET_RPC", "networks.mainnet.url"),
    ("PK", "private_key"),
];

/// Hex private key. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A named network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    /// Expected chain id; the endpoint is rejected when it reports another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

impl NetworkConfig {
    fn new(url: Option<&str>, chain_id: u64) -> Self {
        Self {
            url: url.and_then(|url| Url::parse(url).ok()),
            chain_id: Some(chain_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Name of the network to deploy to, a key of `networks`.
    pub network: String,
    pub networks: BTreeMap<String, NetworkConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
    /// Node-managed account to deploy from when no private key is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked_account: Option<Address>,
    pub artifacts_dir: PathBuf,
    /// Existing reserve token; `None` deploys `ExampleReserveToken`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_token: Option<Address>,
    pub poll_interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            networks: BTreeMap::from([
                ("sepolia".to_string(), NetworkConfig::new(None, 11155111)),
                ("mainnet".to_string(), NetworkConfig::new(None, 1)),
                (
                    "localhost".to_string(),
                    NetworkConfig::new(Some("http://127.0.0.1:8545"), 31337),
                ),
            ]),
            private_key: None,
            unlocked_account: None,
            artifacts_dir: PathBuf::from("artifacts"),
            reserve_token: None,
            poll_interval_ms: 1_000,
            confirmation_timeout_secs: None,
        }
    }
}

impl DeployConfig {
    /// Load from the default sources, reading `config_path` or `./Erc721n.toml`.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = config_path {
            anyhow::ensure!(
                path.exists(),
                "Configuration file not found: {}",
                path.display()
            );
        }

        let path = config_path.unwrap_or(Path::new(CONFIG_FILENAME));
        let config = Self::from_figment(Self::figment(path, |key| std::env::var(key).ok()))?;

        tracing::debug!(
            path = %path.display(),
            network = %config.network,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// The layered sources. `lookup` resolves the legacy variables; empty
    /// values count as unset.
    pub fn figment(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        for &(var, key) in LEGACY_ENV {
            if let Some(value) = lookup(var).filter(|value| !value.trim().is_empty()) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }

        figment
    }

    pub fn from_figment(figment: Figment) -> Result<Self, Box<figment::Error>> {
        figment.extract().map_err(Box::new)
    }

    /// The selected network. Unknown names and missing URLs cannot be reached.
    pub fn selected_network(&self) -> Result<(&Url, &NetworkConfig), DeployError> {
        let network = self.networks.get(&self.network).ok_or_else(|| {
            DeployError::NetworkUnreachable(format!(
                "unknown network '{}' (configured: {})",
                self.network,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let url = network.url.as_ref().ok_or_else(|| {
            DeployError::NetworkUnreachable(format!(
                "no endpoint URL configured for network '{}'",
                self.network
            ))
        })?;

        Ok((url, network))
    }

    /// The deploying account. Without a key or unlocked account there is none.
    pub fn signer(&self) -> Result<Signer, DeployError> {
        if let Some(key) = &self.private_key {
            return Signer::from_private_key(key.expose());
        }

        self.unlocked_account
            .map(Signer::Unlocked)
            .ok_or_else(|| DeployError::NoSignerConfigured {
                network: self.network.clone(),
            })
    }

    pub fn reserve(&self) -> ReserveToken {
        self.reserve_token.into()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }

    /// Build the execution context for the selected network.
    pub fn execution_context(&self) -> Result<ExecutionContext<JsonRpcNetwork>, DeployError> {
        let (url, network) = self.selected_network()?;
        let signer = self.signer()?;

        let rpc = JsonRpcNetwork::new(&self.network, url.clone(), Some(signer))?;
        Ok(ExecutionContext::new(&self.network, rpc)
            .expect_chain_id(network.chain_id)
            .poll_interval(self.poll_interval()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempdir::TempDir;

    use super::*;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn load(path: &Path, env: &[(&str, &str)]) -> DeployConfig {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let figment = DeployConfig::figment(path, |key| env.get(key).cloned());
        DeployConfig::from_figment(figment).unwrap()
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new("config").unwrap();
        let config = load(&dir.path().join(CONFIG_FILENAME), &[]);

        assert_eq!(config.network, "sepolia");
        assert_eq!(config.networks["localhost"].chain_id, Some(31337));
        assert!(config.private_key.is_none());
        assert_eq!(config.reserve(), ReserveToken::Deploy);
    }

    #[test]
    fn test_file_then_legacy_env() {
        let dir = TempDir::new("config").unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
network = "localhost"
reserve_token = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
confirmation_timeout_secs = 60

[networks.sepolia]
url = "https://sepolia.example.org"
"#,
        )
        .unwrap();

        let config = load(
            &path,
            &[("SEPOLIA_RPC", "https://rpc.sepolia.test"), ("PK", DEV_KEY)],
        );

        assert_eq!(config.network, "localhost");
        assert_eq!(
            config.networks["sepolia"].url.as_ref().unwrap().as_str(),
            "https://rpc.sepolia.test/"
        );
        // Chain ids from the defaults survive the partial table in the file.
        assert_eq!(config.networks["sepolia"].chain_id, Some(11155111));
        assert_eq!(config.confirmation_timeout(), Some(Duration::from_secs(60)));
        assert!(matches!(config.reserve(), ReserveToken::Existing(_)));
        assert!(matches!(config.signer().unwrap(), Signer::PrivateKey(_)));
    }

    #[test]
    fn test_empty_legacy_values_are_unset() {
        let dir = TempDir::new("config").unwrap();
        let config = load(
            &dir.path().join(CONFIG_FILENAME),
            &[("PK", ""), ("SEPOLIA_RPC", "  ")],
        );

        assert!(config.private_key.is_none());
        assert!(matches!(
            config.signer(),
            Err(DeployError::NoSignerConfigured { network }) if network == "sepolia"
        ));
        assert!(matches!(
            config.selected_network(),
            Err(DeployError::NetworkUnreachable(_))
        ));
    }

    #[test]
    fn test_unknown_network() {
        let config = DeployConfig {
            network: "goerli".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.selected_network(),
            Err(DeployError::NetworkUnreachable(reason)) if reason.contains("goerli")
        ));
    }

    #[test]
    fn test_execution_context_for_localhost() {
        let config = DeployConfig {
            network: "localhost".to_string(),
            unlocked_account: Some(Address::repeat_byte(0x01)),
            poll_interval_ms: 10,
            ..Default::default()
        };

        let ctx = config.execution_context().unwrap();
        assert_eq!(ctx.name(), "localhost");
        assert_eq!(ctx.expected_chain_id(), Some(31337));
        assert_eq!(ctx.receipt_poll_interval(), Duration::from_millis(10));
        assert_eq!(ctx.network().url().as_str(), "http://127.0.0.1:8545/");
    }

    #[test]
    fn test_private_key_is_redacted() {
        let config = DeployConfig {
            private_key: Some(PrivateKey::new(DEV_KEY)),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("ac0974bec39a17e3"));
    }
}
