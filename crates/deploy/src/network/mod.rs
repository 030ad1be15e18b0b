//! The network seam: everything the pipeline needs from an EVM endpoint.
//!
//! Components never reach for an ambient provider. They receive an
//! [`ExecutionContext`] that owns the [`Network`] handle, so independent runs
//! can share a process without interfering.

mod json_rpc;
mod memory;

use std::{future::Future, sync::Arc, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub use json_rpc::JsonRpcNetwork;
pub use memory::{DEV_ACCOUNT, DEV_CHAIN_ID, InMemoryNetwork};

use crate::DeployError;

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Identity of the target network, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub name: String,
    pub chain_id: u64,
}

/// The deploying account at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: U256,
}

/// Opaque network-state token returned by `evm_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub struct SnapshotId(pub String);

/// A contract creation handed to the network for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Artifact name, for logs and diagnostics only.
    pub artifact: String,
    pub bytecode: Bytes,
    /// ABI-encoded constructor arguments, appended to the bytecode.
    pub constructor_args: Bytes,
    /// Explicit gas limit; estimated by the network when `None`.
    pub gas_limit: Option<u64>,
}

impl DeploymentRequest {
    /// Creation input: bytecode followed by the encoded constructor arguments.
    pub fn init_code(&self) -> Bytes {
        [self.bytecode.as_ref(), self.constructor_args.as_ref()]
            .concat()
            .into()
    }
}

/// Inclusion receipt of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    /// `false` when the transaction reverted.
    pub status: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}

/// Read and submit operations against one EVM network.
pub trait Network: Send + Sync {
    /// Chain id reported by the endpoint.
    fn chain_id(&self) -> impl Future<Output = Result<u64, DeployError>> + Send;

    /// Address of the configured signing account.
    ///
    /// Fails with [`DeployError::NoSignerConfigured`] when there is none.
    fn signer_address(&self) -> impl Future<Output = Result<Address, DeployError>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = Result<U256, DeployError>> + Send;

    /// Sign and submit a contract creation, returning the transaction hash.
    fn submit_deployment(
        &self,
        request: &DeploymentRequest,
    ) -> impl Future<Output = Result<B256, DeployError>> + Send;

    /// Receipt of a transaction, `None` while it is still pending.
    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>, DeployError>> + Send;

    fn code_at(&self, address: Address) -> impl Future<Output = Result<Bytes, DeployError>> + Send;

    /// Read-only call against the latest state.
    fn call(
        &self,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, DeployError>> + Send;
}

/// Snapshot and restore of the complete network state.
///
/// Restoring a handle consumes it, as `evm_revert` does: callers that need the
/// same state again must capture a fresh handle after restoring.
pub trait Checkpoint: Send + Sync {
    fn capture(&self) -> impl Future<Output = Result<SnapshotId, DeployError>> + Send;

    fn restore(
        &self,
        snapshot: &SnapshotId,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;
}

/// Explicit execution context threaded through every component.
pub struct ExecutionContext<N> {
    network: Arc<N>,
    name: String,
    expected_chain_id: Option<u64>,
    poll_interval: Duration,
}

impl<N> Clone for ExecutionContext<N> {
    fn clone(&self) -> Self {
        Self {
            network: Arc::clone(&self.network),
            name: self.name.clone(),
            expected_chain_id: self.expected_chain_id,
            poll_interval: self.poll_interval,
        }
    }
}

impl<N> ExecutionContext<N> {
    pub fn new(name: impl Into<String>, network: N) -> Self {
        Self::from_shared(name, Arc::new(network))
    }

    pub fn from_shared(name: impl Into<String>, network: Arc<N>) -> Self {
        Self {
            network,
            name: name.into(),
            expected_chain_id: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Fail context reads when the endpoint reports another chain.
    pub fn expect_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.expected_chain_id = chain_id;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn shared_network(&self) -> Arc<N> {
        Arc::clone(&self.network)
    }

    /// Configured network name (`sepolia`, `localhost`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected_chain_id(&self) -> Option<u64> {
        self.expected_chain_id
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
