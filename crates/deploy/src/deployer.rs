//! Dependency-ordered deployment of a [`DeploymentPlan`].

use std::time::Duration;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes},
};
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactStore, ConstructorArg, DeployError, DeploymentFailed, DeploymentPlan,
    DeploymentRequest, DeploymentSpec, ExecutionContext, Network, await_confirmation,
    with_timeout,
};

/// A confirmed deployment. Created once per spec and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub artifact: String,
    pub address: Address,
    pub tx_hash: B256,
    pub gas_used: u64,
    pub block_number: u64,
}

/// Deploys plans one spec at a time.
///
/// Spec N+1 is only submitted once spec N is confirmed, since its constructor
/// may need N's address.
pub struct Deployer<'a, N> {
    ctx: &'a ExecutionContext<N>,
    artifacts: &'a ArtifactStore,
    confirmation_timeout: Option<Duration>,
}

impl<'a, N: Network> Deployer<'a, N> {
    pub fn new(ctx: &'a ExecutionContext<N>, artifacts: &'a ArtifactStore) -> Self {
        Self {
            ctx,
            artifacts,
            confirmation_timeout: None,
        }
    }

    /// Fail a spec whose transaction is not mined within `timeout`.
    pub fn confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Deploy every spec of `plan` in order.
    ///
    /// On failure, the error carries the failing index and every record
    /// confirmed before it. Nothing is rolled back.
    pub async fn deploy(
        &self,
        plan: &DeploymentPlan,
    ) -> Result<Vec<DeploymentRecord>, DeploymentFailed> {
        // Nothing is submitted unless every artifact is available.
        if let Some((index, spec)) = plan
            .specs()
            .iter()
            .enumerate()
            .find(|(_, spec)| !self.artifacts.contains(&spec.artifact))
        {
            tracing::error!(index, artifact = %spec.artifact, "Artifact not found");
            return Err(DeploymentFailed {
                index,
                artifact: spec.artifact.clone(),
                cause: DeployError::ArtifactNotFound(spec.artifact.clone()),
                completed: Vec::new(),
            });
        }

        let mut records: Vec<DeploymentRecord> = Vec::with_capacity(plan.len());

        for (index, spec) in plan.specs().iter().enumerate() {
            tracing::info!(
                network = self.ctx.name(),
                index,
                artifact = %spec.artifact,
                "Deploying contract..."
            );

            match self.deploy_spec(spec, &records).await {
                Ok(record) => {
                    tracing::info!(
                        index,
                        artifact = %record.artifact,
                        address = %record.address,
                        tx_hash = %record.tx_hash,
                        gas_used = record.gas_used,
                        "Contract deployed"
                    );
                    records.push(record);
                }
                Err(cause) => {
                    tracing::error!(
                        index,
                        artifact = %spec.artifact,
                        completed = records.len(),
                        error = %cause,
                        "Deployment failed"
                    );
                    return Err(DeploymentFailed {
                        index,
                        artifact: spec.artifact.clone(),
                        cause,
                        completed: records,
                    });
                }
            }
        }

        Ok(records)
    }

    async fn deploy_spec(
        &self,
        spec: &DeploymentSpec,
        records: &[DeploymentRecord],
    ) -> Result<DeploymentRecord, DeployError> {
        let artifact = self.artifacts.get(&spec.artifact)?;
        let constructor_args = encode_constructor_args(spec, records, &artifact)?;

        let request = DeploymentRequest {
            artifact: spec.artifact.clone(),
            bytecode: artifact.bytecode,
            constructor_args,
            gas_limit: spec.gas_limit,
        };

        let tx_hash = self.ctx.network().submit_deployment(&request).await?;
        tracing::debug!(artifact = %spec.artifact, %tx_hash, "Deployment submitted");

        let confirmation = match self.confirmation_timeout {
            Some(timeout) => {
                let confirmed = await_confirmation(self.ctx, tx_hash);
                with_timeout(tx_hash, timeout, confirmed).await?
            }
            None => await_confirmation(self.ctx, tx_hash).await?,
        };

        Ok(DeploymentRecord {
            artifact: spec.artifact.clone(),
            address: confirmation.address,
            tx_hash,
            gas_used: confirmation.gas_used,
            block_number: confirmation.block_number,
        })
    }
}

/// Resolve references against `records` and ABI-encode the constructor arguments.
///
/// When the artifact carries an ABI, arity and types are checked against its
/// constructor before anything is sent.
fn encode_constructor_args(
    spec: &DeploymentSpec,
    records: &[DeploymentRecord],
    artifact: &crate::Artifact,
) -> Result<Bytes, DeployError> {
    let encoding_error = |reason: String| DeployError::Encoding {
        artifact: spec.artifact.clone(),
        reason,
    };

    let values = spec
        .args
        .iter()
        .map(|arg| match arg {
            ConstructorArg::Literal(value) => Ok(value.clone()),
            ConstructorArg::Reference(reference) => records
                .get(reference.index())
                .map(|record| DynSolValue::Address(record.address))
                .ok_or_else(|| encoding_error(format!("{reference} has not been deployed"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if artifact.abi.is_array() {
        let types = artifact.constructor_types()?;
        if types.len() != values.len() {
            return Err(encoding_error(format!(
                "constructor takes {} argument(s), {} given",
                types.len(),
                values.len()
            )));
        }
        if let Some((position, ty)) = types
            .iter()
            .zip(&values)
            .enumerate()
            .find_map(|(position, (ty, value))| (!ty.matches(value)).then_some((position, ty)))
        {
            return Err(encoding_error(format!(
                "argument {position} does not match constructor type {}",
                ty.sol_type_name()
            )));
        }
    }

    if values.is_empty() {
        return Ok(Bytes::new());
    }

    Ok(DynSolValue::Tuple(values).abi_encode_params().into())
}
