//! End-to-end tests for erc721n-deploy.
//!
//! Most tests run the full pipeline against an in-memory network, using
//! Hardhat-layout artifacts written to a temporary directory. The contracts
//! are hand-assembled: `ERC721NTest` returns its constructor argument from
//! every call, which is what `getReserveTokenAddress()` answers.
//!
//! The anvil tests need Foundry on PATH. Run them with:
//! cargo test --test pipeline_test -- --ignored

use std::path::Path;

use alloy_core::primitives::{Address, U256};
use anyhow::Result;
use erc721n_deploy::{
    AnvilCmdBuilder, AnvilInstance, ArtifactStore, DEV_ACCOUNT, DEV_CHAIN_ID, DeployError,
    Erc721nDeployment, ExecutionContext, FixtureCache, InMemoryNetwork, JsonRpcNetwork, Network,
    PipelineError, PipelineOptions, ReserveToken, deploy_erc721n, erc721n::FIXTURE_RESERVE_TOKEN,
    erc721n_plan, run_pipeline,
};
use serde_json::json;
use tempdir::TempDir;

/// Returns the 32 bytes appended after its 24-byte init code.
const ERC721N_TEST_BYTECODE: &str = "0x602c600c600039602c6000f36020600c60003960206000f3";
/// Deploys a single STOP instruction.
const RESERVE_TOKEN_BYTECODE: &str = "0x6001600c60003960016000f300";

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn write_artifact(root: &Path, name: &str, abi: serde_json::Value, bytecode: &str) {
    let dir = root.join("contracts").join(format!("{name}.sol"));
    std::fs::create_dir_all(&dir).unwrap();
    let artifact = json!({
        "_format": "hh-sol-artifact-1",
        "contractName": name,
        "abi": abi,
        "bytecode": bytecode,
        "deployedBytecode": "0x",
    });
    let path = dir.join(format!("{name}.json"));
    std::fs::write(path, artifact.to_string()).unwrap();
    std::fs::write(
        dir.join(format!("{name}.dbg.json")),
        r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/0.json"}"#,
    )
    .unwrap();
}

/// A Hardhat `artifacts/` directory holding both contracts.
fn hardhat_artifacts() -> TempDir {
    let dir = TempDir::new("artifacts").unwrap();
    write_artifact(
        dir.path(),
        "ExampleReserveToken",
        json!([]),
        RESERVE_TOKEN_BYTECODE,
    );
    write_artifact(
        dir.path(),
        "ERC721NTest",
        json!([
            {
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [{ "name": "reserveToken", "type": "address", "internalType": "address" }]
            },
            {
                "type": "function",
                "name": "getReserveTokenAddress",
                "stateMutability": "view",
                "inputs": [],
                "outputs": [{ "name": "", "type": "address", "internalType": "address" }]
            }
        ]),
        ERC721N_TEST_BYTECODE,
    );

    let build_info = dir.path().join("build-info");
    std::fs::create_dir_all(&build_info).unwrap();
    let stray = r#"{"bytecode":"not an artifact"}"#;
    std::fs::write(build_info.join("0.json"), stray).unwrap();

    dir
}

fn in_memory_context(network: InMemoryNetwork) -> ExecutionContext<InMemoryNetwork> {
    ExecutionContext::new("hardhat", network)
        .expect_chain_id(Some(DEV_CHAIN_ID))
        .poll_interval(std::time::Duration::from_millis(1))
}

#[tokio::test]
async fn test_pipeline_deploys_and_verifies_pair() -> Result<()> {
    init_test_tracing();
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    assert_eq!(artifacts.len(), 2);

    let ctx = in_memory_context(InMemoryNetwork::dev().with_confirmation_polls(2));
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let summary = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await?;

    assert!(summary.is_clean(), "warnings: {:?}", summary.warnings);
    assert_eq!(summary.network.as_ref().map(|n| n.chain_id), Some(DEV_CHAIN_ID));
    assert_eq!(summary.deployer, DEV_ACCOUNT);
    assert!(summary.cost.is_positive());
    assert!(summary.balance_after < summary.balance_before);

    let [token, collection] = summary.records.as_slice() else {
        panic!("expected two records, got {:?}", summary.records);
    };
    assert_eq!(token.artifact, "ExampleReserveToken");
    assert_eq!(token.address, DEV_ACCOUNT.create(0));
    assert_eq!(collection.artifact, "ERC721NTest");
    assert_eq!(collection.address, DEV_ACCOUNT.create(1));
    assert!(token.block_number < collection.block_number);

    let pair = Erc721nDeployment::from_records(ReserveToken::Deploy, &summary.records);
    let pair = pair.expect("both records are present");
    assert_eq!(pair.reserve_token, token.address);
    let code = ctx.network().code_at(pair.erc721n.address).await?;
    assert!(!code.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_pipeline_with_existing_reserve_token() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let ctx = in_memory_context(InMemoryNetwork::dev());
    let plan = erc721n_plan(ReserveToken::Existing(FIXTURE_RESERVE_TOKEN))?;

    let summary = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await?;

    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].artifact, "ERC721NTest");
    assert_eq!(summary.records[0].address, DEV_ACCOUNT.create(0));

    Ok(())
}

#[tokio::test]
async fn test_failed_deployment_keeps_completed_records() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let network = InMemoryNetwork::dev();
    network.reject_artifact("ERC721NTest");
    let ctx = in_memory_context(network);
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let err = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await
        .unwrap_err();

    let PipelineError::Deployment(failed) = &err else {
        panic!("expected a deployment failure, got {err:?}");
    };
    assert_eq!(failed.index, 1);
    assert_eq!(failed.artifact, "ERC721NTest");
    assert!(matches!(failed.cause, DeployError::DeploymentReverted { .. }));
    assert_eq!(err.completed().len(), 1);
    assert_eq!(err.completed()[0].artifact, "ExampleReserveToken");

    Ok(())
}

#[tokio::test]
async fn test_missing_signer_aborts_before_submitting() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let network = InMemoryNetwork::new(DEV_CHAIN_ID)
        .with_account(DEV_ACCOUNT, U256::from(10u64).pow(U256::from(18u64)));
    let ctx = in_memory_context(network);
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let err = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Context(DeployError::NoSignerConfigured { .. })
    ));
    assert!(err.completed().is_empty());
    assert_eq!(ctx.network().block_number(), 0);

    Ok(())
}

#[tokio::test]
async fn test_wrong_chain_aborts_before_submitting() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let ctx = ExecutionContext::new("sepolia", InMemoryNetwork::dev())
        .expect_chain_id(Some(11155111));
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let err = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Context(DeployError::ChainIdMismatch {
            expected: 11155111,
            actual: DEV_CHAIN_ID
        })
    ));
    assert_eq!(ctx.network().block_number(), 0);

    Ok(())
}

#[tokio::test]
async fn test_insufficient_funds_fails_first_deployment() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let network = InMemoryNetwork::new(DEV_CHAIN_ID)
        .with_account(DEV_ACCOUNT, U256::from(1u64))
        .with_signer(DEV_ACCOUNT);
    let ctx = in_memory_context(network);
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let err = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await
        .unwrap_err();

    let PipelineError::Deployment(failed) = &err else {
        panic!("expected a deployment failure, got {err:?}");
    };
    assert_eq!(failed.index, 0);
    assert!(failed.completed.is_empty());
    assert!(matches!(failed.cause, DeployError::Rpc { code: -32003, .. }));

    Ok(())
}

#[tokio::test]
async fn test_summary_is_saved_as_toml() -> Result<()> {
    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let ctx = in_memory_context(InMemoryNetwork::dev());
    let plan = erc721n_plan(ReserveToken::Deploy)?;
    let summary = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await?;

    let out = TempDir::new("summary")?;
    let path = out.path().join("deployment.toml");
    summary.save_to_file(&path)?;

    let saved: toml::Value = toml::from_str(&std::fs::read_to_string(&path)?)?;
    let records = saved["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["artifact"].as_str(), Some("ERC721NTest"));
    assert_eq!(
        records[1]["address"].as_str().map(str::to_lowercase),
        Some(DEV_ACCOUNT.create(1).to_string().to_lowercase())
    );

    let rendered = summary.to_string();
    assert!(rendered.contains("ExampleReserveToken"));
    assert!(rendered.contains("ERC721NTest"));

    Ok(())
}

fn in_memory_store() -> ArtifactStore {
    let dir = hardhat_artifacts();
    let store = ArtifactStore::from_dir(dir.path()).unwrap();
    // Parse now; the directory is removed when `dir` drops.
    let artifacts = store
        .names()
        .map(|name| store.get(name).unwrap())
        .collect::<Vec<_>>();
    ArtifactStore::from_artifacts(artifacts)
}

async fn erc721n_fixture<N: Network>(ctx: ExecutionContext<N>) -> Result<Erc721nDeployment> {
    deploy_erc721n(&ctx, &in_memory_store(), ReserveToken::Deploy)
        .await
}

async fn erc721n_with_fixed_token_fixture<N: Network>(
    ctx: ExecutionContext<N>,
) -> Result<Erc721nDeployment> {
    deploy_erc721n(
        &ctx,
        &in_memory_store(),
        ReserveToken::Existing(FIXTURE_RESERVE_TOKEN),
    )
    .await
}

#[tokio::test]
async fn test_fixture_restores_deployed_state() -> Result<()> {
    init_test_tracing();
    let cache = FixtureCache::new(in_memory_context(InMemoryNetwork::dev()));
    let network = cache.context().shared_network();

    let first = cache.load(erc721n_fixture::<InMemoryNetwork>).await?;
    let deployed_at = network.block_number();
    let balance = network.balance(DEV_ACCOUNT).await?;
    assert_eq!(deployed_at, 2);

    // A test mutating the chain after loading.
    deploy_erc721n(cache.context(), &in_memory_store(), ReserveToken::Deploy)
        .await?;
    network.set_balance(DEV_ACCOUNT, U256::ZERO);
    assert_eq!(network.block_number(), 4);

    let second = cache.load(erc721n_fixture::<InMemoryNetwork>).await?;
    assert_eq!(first, second);
    assert_eq!(network.block_number(), deployed_at);
    assert_eq!(network.balance(DEV_ACCOUNT).await?, balance);
    assert_eq!(cache.restore_failures(), 0);
    assert_eq!(cache.len().await, 1);

    Ok(())
}

#[tokio::test]
async fn test_fixture_restore_drops_younger_fixtures() -> Result<()> {
    let cache = FixtureCache::new(in_memory_context(InMemoryNetwork::dev()));
    let network = cache.context().shared_network();

    let pair = cache.load(erc721n_fixture::<InMemoryNetwork>).await?;
    let fixed = cache
        .load(erc721n_with_fixed_token_fixture::<InMemoryNetwork>)
        .await?;
    assert_eq!(fixed.reserve_token, FIXTURE_RESERVE_TOKEN);
    assert_eq!(network.block_number(), 3);
    assert_eq!(cache.len().await, 2);

    // Going back to the older snapshot discards the state the younger one captured.
    assert_eq!(cache.load(erc721n_fixture::<InMemoryNetwork>).await?, pair);
    assert_eq!(network.block_number(), 2);
    assert_eq!(cache.len().await, 1);

    let redeployed = cache
        .load(erc721n_with_fixed_token_fixture::<InMemoryNetwork>)
        .await?;
    assert_eq!(redeployed.erc721n.address, fixed.erc721n.address);
    assert_eq!(network.block_number(), 3);

    Ok(())
}

#[tokio::test]
async fn test_fixture_recovers_from_reset_network() -> Result<()> {
    let cache = FixtureCache::new(in_memory_context(InMemoryNetwork::dev()));
    let network = cache.context().shared_network();

    let first = cache.load(erc721n_fixture::<InMemoryNetwork>).await?;

    // A reset forgets every snapshot, so the cached one is rejected.
    network.reset();
    let second = cache.load(erc721n_fixture::<InMemoryNetwork>).await?;

    assert_eq!(cache.restore_failures(), 1);
    assert_eq!(first.reserve_token, second.reserve_token);
    assert_eq!(first.erc721n.address, second.erc721n.address);
    assert!(!network.code_at(second.erc721n.address).await?.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore = "requires anvil on PATH"]
async fn test_anvil_pipeline() -> Result<()> {
    init_test_tracing();
    let anvil = AnvilInstance::spawn(AnvilCmdBuilder::default()).await?;
    let ctx = anvil.context()?;

    let dir = hardhat_artifacts();
    let artifacts = ArtifactStore::from_dir(dir.path())?;
    let plan = erc721n_plan(ReserveToken::Deploy)?;

    let summary = run_pipeline(&ctx, &artifacts, &plan, &PipelineOptions::default())
        .await?;

    assert_eq!(summary.network.as_ref().map(|n| n.chain_id), Some(DEV_CHAIN_ID));
    assert_eq!(summary.records.len(), 2);
    assert!(summary.cost.is_positive());
    for record in &summary.records {
        assert_ne!(record.address, Address::ZERO);
        assert!(!ctx.network().code_at(record.address).await?.is_empty());
    }

    Ok(())
}

#[tokio::test]
#[ignore = "requires anvil on PATH"]
async fn test_anvil_fixture_snapshots() -> Result<()> {
    let anvil = AnvilInstance::spawn(AnvilCmdBuilder::default()).await?;
    let cache = FixtureCache::new(anvil.context()?);

    let first = cache.load(erc721n_fixture::<JsonRpcNetwork>).await?;
    let balance = cache.context().network().balance(DEV_ACCOUNT).await?;

    // Mutate the chain, then load again: the snapshot brings it back.
    deploy_erc721n(cache.context(), &in_memory_store(), ReserveToken::Deploy)
        .await?;
    let second = cache.load(erc721n_fixture::<JsonRpcNetwork>).await?;

    assert_eq!(first, second);
    let restored = cache.context().network().balance(DEV_ACCOUNT).await?;
    assert_eq!(restored, balance);
    assert_eq!(cache.restore_failures(), 0);

    Ok(())
}
