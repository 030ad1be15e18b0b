//! In-process development network.
//!
//! Mirrors the parts of an anvil node the pipeline relies on: funded dev
//! accounts, CREATE addresses derived from sender and nonce, gas charged at a
//! fixed price, receipts that appear after a configurable number of polls, and
//! `evm_snapshot`/`evm_revert` semantics (reverting consumes the snapshot and
//! every later one).
//!
//! Contracts do not execute. A call returns the ABI-encoded constructor
//! arguments the contract was created with, which is exactly what
//! getter-of-constructor-argument contracts return.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};

use super::{Checkpoint, DeploymentRequest, Network, SnapshotId, TransactionReceipt};
use crate::DeployError;

/// Chain id used by anvil and hardhat node.
pub const DEV_CHAIN_ID: u64 = 31337;

/// First anvil / hardhat development account.
pub const DEV_ACCOUNT: Address = Address::new([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79, 0xcf,
    0xff, 0xb9, 0x22, 0x66,
]);

/// Gas price charged for every transaction, in wei (1 gwei).
const GAS_PRICE: u64 = 1_000_000_000;

/// Intrinsic gas of a contract creation (21000 + 32000).
const CREATION_GAS: u64 = 53_000;

/// Gas charged per byte of init code.
const GAS_PER_BYTE: u64 = 16;

#[derive(Debug, Clone)]
struct DeployedContract {
    code: Bytes,
    constructor_args: Bytes,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    block_number: u64,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, DeployedContract>,
    receipts: HashMap<B256, TransactionReceipt>,
}

#[derive(Debug, Default)]
struct Inner {
    state: ChainState,
    snapshots: Vec<(SnapshotId, ChainState)>,
    next_snapshot: u64,
    /// Remaining `None` answers before a receipt becomes visible.
    pending: HashMap<B256, u32>,
    rejected_artifacts: HashSet<String>,
}

/// In-memory [`Network`] + [`Checkpoint`] implementation.
#[derive(Debug)]
pub struct InMemoryNetwork {
    chain_id: u64,
    signer: Option<Address>,
    confirmation_polls: u32,
    inner: Mutex<Inner>,
}

impl Default for InMemoryNetwork {
    fn default() -> Self {
        Self::dev()
    }
}

impl InMemoryNetwork {
    /// An empty network with no accounts and no signer.
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            signer: None,
            confirmation_polls: 1,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Chain 31337 with the first dev account funded with 10000 ether and used as signer.
    pub fn dev() -> Self {
        let ten_thousand_ether = U256::from(10_000u64) * U256::from(10u64).pow(U256::from(18u64));
        Self::new(DEV_CHAIN_ID)
            .with_account(DEV_ACCOUNT, ten_thousand_ether)
            .with_signer(DEV_ACCOUNT)
    }

    pub fn with_account(self, address: Address, balance: U256) -> Self {
        self.lock().state.balances.insert(address, balance);
        self
    }

    pub fn with_signer(mut self, address: Address) -> Self {
        self.signer = Some(address);
        self
    }

    /// Number of receipt polls answered with `None` before a transaction shows as mined.
    pub fn with_confirmation_polls(mut self, polls: u32) -> Self {
        self.confirmation_polls = polls;
        self
    }

    /// Make every later deployment of `artifact` revert.
    pub fn reject_artifact(&self, artifact: impl Into<String>) {
        self.lock().rejected_artifacts.insert(artifact.into());
    }

    /// Credit or debit an account outside of any transaction.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock().state.balances.insert(address, balance);
    }

    /// Drop all state and snapshots, like `anvil_reset` without a fork.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let balances = inner.state.balances.clone();
        inner.state = ChainState {
            balances,
            ..ChainState::default()
        };
        inner.snapshots.clear();
        inner.pending.clear();
    }

    pub fn block_number(&self) -> u64 {
        self.lock().state.block_number
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deploy(&self, request: &DeploymentRequest) -> Result<B256, DeployError> {
        let from = self.signer.ok_or_else(|| DeployError::NoSignerConfigured {
            network: "in-memory".to_string(),
        })?;

        let mut inner = self.lock();
        let init_code = request.init_code();
        let gas_used = request
            .gas_limit
            .unwrap_or(CREATION_GAS + GAS_PER_BYTE * init_code.len() as u64);
        let fee = U256::from(gas_used) * U256::from(GAS_PRICE);

        let balance = inner.state.balances.get(&from).copied().unwrap_or_default();
        if balance < fee {
            return Err(DeployError::Rpc {
                method: "eth_sendRawTransaction".to_string(),
                code: -32003,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }

        let nonce = inner.state.nonces.get(&from).copied().unwrap_or_default();
        let tx_hash = keccak256(
            [
                from.as_slice(),
                nonce.to_be_bytes().as_slice(),
                init_code.as_ref(),
            ]
            .concat(),
        );
        let address = from.create(nonce);
        let reverted = inner.rejected_artifacts.contains(&request.artifact);

        let state = &mut inner.state;
        state.block_number += 1;
        state.balances.insert(from, balance - fee);
        state.nonces.insert(from, nonce + 1);
        if !reverted {
            state.contracts.insert(
                address,
                DeployedContract {
                    code: request.bytecode.clone(),
                    constructor_args: request.constructor_args.clone(),
                },
            );
        }
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: state.block_number,
            status: !reverted,
            contract_address: (!reverted).then_some(address),
            gas_used,
        };
        state.receipts.insert(tx_hash, receipt);
        inner.pending.insert(tx_hash, self.confirmation_polls);

        tracing::trace!(
            artifact = %request.artifact,
            %tx_hash,
            %address,
            reverted,
            "In-memory deployment mined"
        );

        Ok(tx_hash)
    }
}

impl Network for InMemoryNetwork {
    async fn chain_id(&self) -> Result<u64, DeployError> {
        Ok(self.chain_id)
    }

    async fn signer_address(&self) -> Result<Address, DeployError> {
        self.signer.ok_or_else(|| DeployError::NoSignerConfigured {
            network: "in-memory".to_string(),
        })
    }

    async fn balance(&self, address: Address) -> Result<U256, DeployError> {
        Ok(self
            .lock()
            .state
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn submit_deployment(&self, request: &DeploymentRequest) -> Result<B256, DeployError> {
        self.deploy(request)
    }

    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        let mut inner = self.lock();
        if let Some(remaining) = inner.pending.get_mut(&tx_hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(inner.state.receipts.get(&tx_hash).cloned())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, DeployError> {
        Ok(self
            .lock()
            .state
            .contracts
            .get(&address)
            .map(|contract| contract.code.clone())
            .unwrap_or_default())
    }

    async fn call(&self, to: Address, _data: Bytes) -> Result<Bytes, DeployError> {
        Ok(self
            .lock()
            .state
            .contracts
            .get(&to)
            .map(|contract| contract.constructor_args.clone())
            .unwrap_or_default())
    }
}

impl Checkpoint for InMemoryNetwork {
    async fn capture(&self) -> Result<SnapshotId, DeployError> {
        let mut inner = self.lock();
        let id = SnapshotId(format!("0x{:x}", inner.next_snapshot));
        inner.next_snapshot += 1;
        let state = inner.state.clone();
        inner.snapshots.push((id.clone(), state));
        Ok(id)
    }

    async fn restore(&self, snapshot: &SnapshotId) -> Result<(), DeployError> {
        let mut inner = self.lock();
        let position = inner
            .snapshots
            .iter()
            .position(|(id, _)| id == snapshot)
            .ok_or_else(|| DeployError::SnapshotRejected(snapshot.clone()))?;

        let (_, state) = inner.snapshots.swap_remove(position);
        inner.snapshots.truncate(position);
        inner.state = state;
        Ok(())
    }
}
