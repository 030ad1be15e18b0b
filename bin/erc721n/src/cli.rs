use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use erc721n_deploy::{DeployConfig, PrivateKey};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkName {
    Sepolia,
    Mainnet,
    Localhost,
    #[strum(default)]
    Custom(String),
}

impl NetworkName {
    /// Key of the network in the configuration's `networks` table.
    pub fn key(&self) -> String {
        match self {
            NetworkName::Custom(name) => name.clone(),
            known => known.to_string(),
        }
    }
}

#[derive(Parser)]
#[command(name = "erc721n")]
#[command(author, version, about = "Deploy and verify the ERC721N contracts")]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        global = true,
        env = "ERC721N_VERBOSITY",
        default_value_t = LevelFilter::INFO
    )]
    pub verbosity: LevelFilter,

    /// Path to an Erc721n.toml configuration file.
    ///
    /// Defaults to ./Erc721n.toml when it exists.
    #[arg(long, alias = "conf", global = true, env = "ERC721N_CONFIG")]
    pub config: Option<PathBuf>,

    /// The network to deploy to (sepolia, mainnet, localhost, or a name from the config file).
    #[arg(short, long, global = true)]
    pub network: Option<NetworkName>,

    /// Override the RPC URL of the selected network.
    #[arg(long, alias = "rpc", global = true)]
    pub rpc_url: Option<Url>,

    /// Hex private key of the deploying account.
    #[arg(long, global = true, hide_env_values = true, env = "ERC721N_PRIVATE_KEY")]
    pub private_key: Option<String>,

    /// Deploy from a node-managed account instead of a private key.
    #[arg(long, global = true, conflicts_with = "private_key")]
    pub unlocked: Option<Address>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the reserve token and the ERC721N collection, then verify them.
    Deploy(DeployArgs),
    /// Print the network identity and the deploying account.
    Context {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Directory holding the compiled Hardhat or Foundry artifacts.
    #[arg(long, alias = "artifacts-dir")]
    pub artifacts: Option<PathBuf>,

    /// Use an existing reserve token instead of deploying ExampleReserveToken.
    #[arg(long)]
    pub reserve_token: Option<Address>,

    /// Give up on a deployment that is not mined after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip the post-deployment checks.
    #[arg(long)]
    pub skip_verify: bool,

    /// Start a local anvil node and deploy to it from its first dev account.
    ///
    /// The configured network and signer are ignored.
    #[arg(long)]
    pub anvil: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Also write the summary to this TOML file.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides, which take precedence over every other source.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(network) = &self.network {
            config.network = network.key();
        }
        if let Some(url) = &self.rpc_url {
            config
                .networks
                .entry(config.network.clone())
                .or_insert_with(|| erc721n_deploy::NetworkConfig {
                    url: None,
                    chain_id: None,
                })
                .url = Some(url.clone());
        }
        if let Some(key) = self
            .private_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
        {
            config.private_key = Some(PrivateKey::new(key));
        }
        if let Some(account) = self.unlocked {
            config.unlocked_account = Some(account);
            config.private_key = None;
        }

        if let Command::Deploy(args) = &self.command {
            if let Some(dir) = &args.artifacts {
                config.artifacts_dir = dir.clone();
            }
            if let Some(token) = args.reserve_token {
                config.reserve_token = Some(token);
            }
            if let Some(timeout) = args.timeout {
                config.confirmation_timeout_secs = Some(timeout);
            }
        }
    }
}
