//! Read-only checks run against a finished deployment.

use alloy_core::{dyn_abi::DynSolType, primitives::Address};

use crate::{
    DeploymentPlan, DeploymentRecord, ExecutionContext, ExpectedAddress, Network,
    VerificationError,
};

/// Check that every record has code and that every address check of `plan` holds.
pub async fn verify<N: Network>(
    ctx: &ExecutionContext<N>,
    plan: &DeploymentPlan,
    records: &[DeploymentRecord],
) -> Result<(), VerificationError> {
    let network = ctx.network();

    for record in records {
        let code = network.code_at(record.address).await?;
        if code.is_empty() {
            return Err(VerificationError::MissingCode {
                artifact: record.artifact.clone(),
                address: record.address,
            });
        }
    }

    for check in plan.checks() {
        let contract = record_at(records, check.contract.index())?;
        let expected = match check.expected {
            ExpectedAddress::Deployed(reference) => record_at(records, reference.index())?.address,
            ExpectedAddress::Fixed(address) => address,
        };

        let output = network.call(contract.address, check.calldata()).await?;
        let actual = decode_address(&output).map_err(|reason| {
            VerificationError::UndecodableResult {
                artifact: contract.artifact.clone(),
                getter: check.getter.clone(),
                reason,
            }
        })?;

        if actual != expected {
            return Err(VerificationError::AddressMismatch {
                artifact: contract.artifact.clone(),
                getter: check.getter.clone(),
                expected,
                actual,
            });
        }

        tracing::info!(
            contract = %contract.artifact,
            getter = %check.getter,
            %actual,
            "Verified deployed address"
        );
    }

    Ok(())
}

fn record_at(
    records: &[DeploymentRecord],
    index: usize,
) -> Result<&DeploymentRecord, VerificationError> {
    records
        .get(index)
        .ok_or(VerificationError::MissingRecord(index))
}

fn decode_address(output: &[u8]) -> Result<Address, String> {
    DynSolType::Address
        .abi_decode(output)
        .map_err(|e| e.to_string())?
        .as_address()
        .ok_or_else(|| "decoded value is not an address".to_string())
}
