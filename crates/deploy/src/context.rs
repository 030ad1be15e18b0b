//! Reads the identity of the target network and the deploying account.

use alloy_core::primitives::Address;

use crate::{Account, DeployError, ExecutionContext, Network, NetworkIdentity};

/// Identity of the network plus the signer's address and balance. Read-only.
pub async fn read_context<N: Network>(
    ctx: &ExecutionContext<N>,
) -> Result<(NetworkIdentity, Account), DeployError> {
    let network = ctx.network();

    let chain_id = network.chain_id().await?;
    match ctx.expected_chain_id() {
        Some(expected) if expected != chain_id => {
            return Err(DeployError::ChainIdMismatch {
                expected,
                actual: chain_id,
            });
        }
        _ => {}
    }

    let address = network.signer_address().await?;
    let account = read_account(ctx, address).await?;

    tracing::info!(
        network = ctx.name(),
        chain_id,
        deployer = %account.address,
        balance = %account.balance,
        "Connected to network"
    );

    Ok((
        NetworkIdentity {
            name: ctx.name().to_string(),
            chain_id,
        },
        account,
    ))
}

/// Current balance of `address`.
pub async fn read_account<N: Network>(
    ctx: &ExecutionContext<N>,
    address: Address,
) -> Result<Account, DeployError> {
    let balance = ctx.network().balance(address).await?;
    Ok(Account { address, balance })
}
