//! Waits for deployment transactions to be mined.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256};

use crate::{DeployError, ExecutionContext, Network};

/// A mined, successful contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: B256,
    pub address: Address,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Poll for the receipt of `tx_hash` until it is mined.
///
/// There is no built-in deadline; wrap the future with [`with_timeout`] to
/// bound the wait.
pub async fn await_confirmation<N: Network>(
    ctx: &ExecutionContext<N>,
    tx_hash: B256,
) -> Result<Confirmation, DeployError> {
    let mut polls = 0u64;

    loop {
        if let Some(receipt) = ctx.network().transaction_receipt(tx_hash).await? {
            if !receipt.status {
                return Err(DeployError::DeploymentReverted { tx_hash });
            }

            // A successful creation always carries the new contract address.
            let Some(address) = receipt.contract_address else {
                return Err(DeployError::DeploymentReverted { tx_hash });
            };

            tracing::debug!(
                %tx_hash,
                %address,
                block_number = receipt.block_number,
                polls,
                "Transaction confirmed"
            );

            return Ok(Confirmation {
                tx_hash,
                address,
                block_number: receipt.block_number,
                gas_used: receipt.gas_used,
            });
        }

        polls += 1;
        tracing::trace!(%tx_hash, polls, "Transaction pending");
        tokio::time::sleep(ctx.receipt_poll_interval()).await;
    }
}

/// Bound a confirmation wait by `timeout`.
pub async fn with_timeout<T, F>(tx_hash: B256, timeout: Duration, fut: F) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DeployError::ConfirmationTimeout {
            tx_hash,
            elapsed: timeout,
        })?
}
