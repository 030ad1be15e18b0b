//! erc721n deploys the ERC721N contracts and their reserve token to an EVM network.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, DeployArgs};
use erc721n_deploy::{
    AnvilCmdBuilder, AnvilInstance, ArtifactStore, DeployConfig, PipelineOptions, erc721n,
    erc721n_plan, read_context, run_pipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut config = DeployConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    match cli.command {
        Command::Deploy(args) => deploy(config, args).await,
        Command::Context { json } => context(config, json).await,
    }
}

async fn deploy(config: DeployConfig, args: DeployArgs) -> Result<()> {
    let artifacts = ArtifactStore::from_dir(&config.artifacts_dir).context(format!(
        "Failed to load artifacts from {}",
        config.artifacts_dir.display()
    ))?;
    let plan = erc721n_plan(config.reserve())?;
    let options = PipelineOptions {
        confirmation_timeout: config.confirmation_timeout(),
        skip_verification: args.skip_verify,
    };

    // Keeps the node alive until the run is over.
    let mut anvil = None;
    let ctx = if args.anvil {
        let instance = AnvilInstance::spawn(AnvilCmdBuilder::default()).await?;
        let ctx = instance.context()?;
        anvil = Some(instance);
        ctx
    } else {
        config.execution_context()?
    };

    tracing::info!(
        network = ctx.name(),
        artifacts = artifacts.len(),
        deployments = plan.len(),
        "Starting deployment..."
    );

    let summary = match run_pipeline(&ctx, &artifacts, &plan, &options).await {
        Ok(summary) => summary,
        Err(err) => {
            for record in err.completed() {
                tracing::error!(
                    artifact = %record.artifact,
                    address = %record.address,
                    tx_hash = %record.tx_hash,
                    "Deployed before the failure"
                );
            }
            return Err(err).context("Deployment pipeline failed");
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }

    if let Some(out) = &args.out {
        summary.save_to_file(out)?;
    }

    if let Some(record) = summary
        .records
        .iter()
        .find(|record| record.artifact == erc721n::CONSUMER_ARTIFACT)
    {
        tracing::info!(address = %record.address, "ERC721NTest deployed");
    }

    drop(anvil);
    Ok(())
}

async fn context(config: DeployConfig, json: bool) -> Result<()> {
    let ctx = config.execution_context()?;
    let (identity, account) = read_context(&ctx)
        .await
        .context("Failed to read network context")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "network": identity,
                "account": account,
            }))?
        );
    } else {
        println!("Network:  {} (chain id {})", identity.name, identity.chain_id);
        println!("Deployer: {}", account.address);
        println!(
            "Balance:  {} wei ({})",
            account.balance,
            erc721n_deploy::format_ether(account.balance.try_into().unwrap_or_default())
        );
    }

    Ok(())
}
