//! End-to-end deployment run: context, deployment, report, verification.

use std::time::Duration;

use crate::{
    ArtifactStore, Deployer, DeploymentPlan, ExecutionContext, Network, PipelineError, Summary,
    read_account, read_context, report, verify,
};

/// Knobs of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Per-deployment bound on the confirmation wait.
    pub confirmation_timeout: Option<Duration>,
    pub skip_verification: bool,
}

/// Run `plan` against the context's network and summarize the outcome.
///
/// Configuration and connectivity failures abort before anything is sent. Any
/// later failure carries the records confirmed so far.
pub async fn run_pipeline<N: Network>(
    ctx: &ExecutionContext<N>,
    artifacts: &ArtifactStore,
    plan: &DeploymentPlan,
    options: &PipelineOptions,
) -> Result<Summary, PipelineError> {
    let (identity, before) = read_context(ctx).await.map_err(PipelineError::Context)?;

    let records = Deployer::new(ctx, artifacts)
        .confirmation_timeout(options.confirmation_timeout)
        .deploy(plan)
        .await?;

    let after = match read_account(ctx, before.address).await {
        Ok(after) => after,
        Err(source) => {
            return Err(PipelineError::Balance {
                source,
                completed: records,
            });
        }
    };

    let summary = report(&before, &after, &records).with_network(identity);

    if options.skip_verification {
        tracing::debug!("Skipping deployment verification");
    } else if let Err(source) = verify(ctx, plan, &summary.records).await {
        return Err(PipelineError::Verification {
            source,
            summary: Box::new(summary),
        });
    }

    tracing::info!(
        network = ctx.name(),
        deployments = summary.records.len(),
        cost = %summary.cost,
        "Deployment complete"
    );

    Ok(summary)
}
