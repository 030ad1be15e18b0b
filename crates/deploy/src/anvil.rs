//! Local anvil node for development runs and integration tests.

use std::{process::Stdio, time::Duration};

use anyhow::Context;
use tokio::process::{Child, Command};
use url::Url;

use crate::{DEV_ACCOUNT, DEV_CHAIN_ID, ExecutionContext, JsonRpcNetwork, rpc, signer::Signer};

/// Time allowed for anvil to start answering RPC requests.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Builder for anvil command-line arguments.
#[derive(Debug, Clone)]
pub struct AnvilCmdBuilder {
    host: String,
    port: u16,
    chain_id: u64,
    block_time: Option<u64>,
    accounts: u32,
    extra_args: Vec<String>,
}

impl Default for AnvilCmdBuilder {
    fn default() -> Self {
        Self::new(DEV_CHAIN_ID)
    }
}

impl AnvilCmdBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            chain_id,
            block_time: None,
            accounts: 10,
            extra_args: Vec::new(),
        }
    }

    /// Port to listen on; `0` picks a free one.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Mine a block every `seconds` instead of one per transaction.
    pub fn block_time(mut self, seconds: Option<u64>) -> Self {
        self.block_time = seconds;
        self
    }

    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut cmd = vec![
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
            "--chain-id".to_string(),
            self.chain_id.to_string(),
            "--accounts".to_string(),
            self.accounts.to_string(),
        ];

        if let Some(block_time) = self.block_time {
            cmd.push("--block-time".to_string());
            cmd.push(block_time.to_string());
        }

        cmd.extend(self.extra_args.iter().cloned());
        cmd
    }
}

/// A running anvil process, killed on drop.
#[derive(Debug)]
pub struct AnvilInstance {
    _child: Child,
    url: Url,
    chain_id: u64,
}

impl AnvilInstance {
    /// Spawn `anvil` from `PATH` and wait until it answers `eth_chainId`.
    pub async fn spawn(builder: AnvilCmdBuilder) -> anyhow::Result<Self> {
        let mut builder = builder;
        if builder.port == 0 {
            builder.port = free_port()?;
        }

        let args = builder.build();
        tracing::debug!(?args, "Starting anvil...");

        let child = Command::new("anvil")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start anvil; is Foundry installed and on PATH?")?;

        let url = Url::parse(&format!("http://{}:{}", builder.host, builder.port))
            .context("Invalid anvil URL")?;

        let client = rpc::create_client()?;
        rpc::wait_until_ready("anvil", STARTUP_TIMEOUT, || {
            let (client, url) = (&client, &url);
            async move {
                rpc::json_rpc_call::<String>(client, url.as_str(), "eth_chainId", vec![])
                    .await
                    .map(|_| ())
            }
        })
        .await?;

        tracing::info!(url = %url, chain_id = builder.chain_id, "Anvil is ready");

        Ok(Self {
            _child: child,
            url,
            chain_id: builder.chain_id,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Context deploying from anvil's first unlocked dev account.
    pub fn context(&self) -> anyhow::Result<ExecutionContext<JsonRpcNetwork>> {
        let network = JsonRpcNetwork::new(
            "anvil",
            self.url.clone(),
            Some(Signer::Unlocked(DEV_ACCOUNT)),
        )?;
        Ok(ExecutionContext::new("anvil", network)
            .expect_chain_id(Some(self.chain_id))
            .poll_interval(Duration::from_millis(100)))
    }
}

fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .context("Failed to find a free port")?;
    Ok(listener.local_addr()?.port())
}
