//! [`Network`] and [`Checkpoint`] over HTTP JSON-RPC.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64, U256};
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::{Checkpoint, DeploymentRequest, Network, SnapshotId, TransactionReceipt};
use crate::{
    DeployError, rpc,
    signer::{self, Signer},
};

/// Headroom applied on top of `eth_estimateGas`, in percent.
const GAS_ESTIMATE_MARGIN_PERCENT: u64 = 20;

/// Retries of an idempotent read after a transient failure.
const MAX_READ_RETRIES: usize = 3;

const READ_RETRY_DELAY: Duration = Duration::from_millis(200);

/// JSON-RPC endpoint plus the account used to sign deployments.
#[derive(Debug, Clone)]
pub struct JsonRpcNetwork {
    client: reqwest::Client,
    url: Url,
    name: String,
    signer: Option<Signer>,
}

/// Receipt as returned on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    status: Option<U64>,
    contract_address: Option<Address>,
    gas_used: U64,
}

impl JsonRpcNetwork {
    pub fn new(
        name: impl Into<String>,
        url: Url,
        signer: Option<Signer>,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            client: rpc::create_client()?,
            url,
            name: name.into(),
            signer,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn signer(&self) -> Result<&Signer, DeployError> {
        self.signer
            .as_ref()
            .ok_or_else(|| DeployError::NoSignerConfigured {
                network: self.name.clone(),
            })
    }

    /// Idempotent read, retried while the endpoint is unreachable.
    async fn read<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, DeployError> {
        (|| rpc::json_rpc_call::<T>(&self.client, self.url.as_str(), method, params.clone()))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(READ_RETRY_DELAY)
                    .with_max_times(MAX_READ_RETRIES),
            )
            .when(DeployError::is_transient)
            .notify(|err, delay| {
                tracing::debug!(error = %err, ?delay, method, "Retrying RPC read");
            })
            .await
    }

    /// Single attempt, for calls that must not be repeated blindly.
    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, DeployError> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params)
            .await
    }

    async fn quantity(&self, method: &'static str, params: Vec<Value>) -> Result<u64, DeployError> {
        let value: String = self.read(method, params).await?;
        rpc::parse_quantity(method, &value)
    }

    async fn estimate_gas(&self, from: Address, input: &Bytes) -> Result<u64, DeployError> {
        let estimate = self
            .quantity("eth_estimateGas", vec![json!({ "from": from, "data": input })])
            .await?;
        Ok(estimate + estimate * GAS_ESTIMATE_MARGIN_PERCENT / 100)
    }
}

impl Network for JsonRpcNetwork {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        self.quantity("eth_chainId", vec![]).await
    }

    async fn signer_address(&self) -> Result<Address, DeployError> {
        Ok(self.signer()?.address())
    }

    async fn balance(&self, address: Address) -> Result<U256, DeployError> {
        self.read("eth_getBalance", vec![json!(address), json!("latest")])
            .await
    }

    async fn submit_deployment(&self, request: &DeploymentRequest) -> Result<B256, DeployError> {
        let account = self.signer()?;
        let input = request.init_code();

        match account {
            Signer::Unlocked(from) => {
                let mut tx = json!({ "from": from, "data": input });
                if let Some(gas) = request.gas_limit {
                    tx["gas"] = json!(format!("0x{gas:x}"));
                }
                self.send("eth_sendTransaction", vec![tx]).await
            }
            Signer::PrivateKey(key) => {
                let from = key.address();
                let nonce = self
                    .quantity("eth_getTransactionCount", vec![json!(from), json!("pending")])
                    .await?;
                let gas_price: U256 = self.read("eth_gasPrice", vec![]).await?;
                let gas_limit = match request.gas_limit {
                    Some(gas) => gas,
                    None => self.estimate_gas(from, &input).await?,
                };
                let chain_id = self.chain_id().await?;

                let signed = signer::sign_creation(
                    key,
                    signer::creation_tx(
                        chain_id,
                        nonce,
                        gas_price.saturating_to::<u128>(),
                        gas_limit,
                        input,
                    ),
                )?;

                tracing::debug!(
                    artifact = %request.artifact,
                    nonce,
                    gas_limit,
                    tx_hash = %signed.hash,
                    "Submitting signed deployment"
                );

                self.send("eth_sendRawTransaction", vec![json!(signed.raw)])
                    .await
            }
        }
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        let receipt: Option<RpcReceipt> = self
            .read("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;

        // Some nodes return a receipt without a block number for pending transactions.
        let Some(receipt) = receipt.filter(|r| r.block_number.is_some()) else {
            return Ok(None);
        };

        Ok(Some(TransactionReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt
                .block_number
                .map(|n| n.to::<u64>())
                .unwrap_or_default(),
            status: receipt.status.is_none_or(|s| s.to::<u64>() == 1),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used.to::<u64>(),
        }))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        self.read("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeployError> {
        self.read("eth_call", vec![json!({ "to": to, "data": data }), json!("latest")])
            .await
    }
}

impl Checkpoint for JsonRpcNetwork {
    async fn capture(&self) -> Result<SnapshotId, DeployError> {
        let id: String = self.send("evm_snapshot", vec![]).await?;
        Ok(SnapshotId(id))
    }

    async fn restore(&self, snapshot: &SnapshotId) -> Result<(), DeployError> {
        let reverted: bool = self.send("evm_revert", vec![json!(snapshot.0)]).await?;
        if reverted {
            Ok(())
        } else {
            Err(DeployError::SnapshotRejected(snapshot.clone()))
        }
    }
}
