//! The ERC721N contract pair: a reserve ERC20 token and the ERC721N
//! collection that is constructed with its address.

use alloy_core::primitives::{Address, address};
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactStore, DeploymentPlan, DeploymentRecord, DeploymentSpec, Deployer,
    ExecutionContext, Network, PlanError,
};

pub const RESERVE_TOKEN_ARTIFACT: &str = "ExampleReserveToken";
pub const CONSUMER_ARTIFACT: &str = "ERC721NTest";

/// Getter exposing the reserve token the collection was constructed with.
pub const RESERVE_TOKEN_GETTER: &str = "getReserveTokenAddress()";

/// Reserve token address the test fixture constructs the collection with.
pub const FIXTURE_RESERVE_TOKEN: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// Where the collection's reserve token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReserveToken {
    /// Deploy `ExampleReserveToken` first and use its address.
    #[default]
    Deploy,
    /// Use a token that already exists on the network.
    Existing(Address),
}

impl From<Option<Address>> for ReserveToken {
    fn from(address: Option<Address>) -> Self {
        address.map_or(Self::Deploy, Self::Existing)
    }
}

/// Plan deploying the collection, plus the reserve token when needed, with
/// the `getReserveTokenAddress()` check attached.
pub fn erc721n_plan(reserve: ReserveToken) -> Result<DeploymentPlan, PlanError> {
    let mut builder = DeploymentPlan::builder();

    match reserve {
        ReserveToken::Deploy => {
            let token = builder.deploy(DeploymentSpec::new(RESERVE_TOKEN_ARTIFACT));
            let consumer = DeploymentSpec::new(CONSUMER_ARTIFACT).arg(token);
            let collection = builder.deploy(consumer);
            builder.expect_address(collection, RESERVE_TOKEN_GETTER, token);
        }
        ReserveToken::Existing(address) => {
            let consumer = DeploymentSpec::new(CONSUMER_ARTIFACT).arg(address);
            let collection = builder.deploy(consumer);
            builder.expect_address(collection, RESERVE_TOKEN_GETTER, address);
        }
    }

    builder.build()
}

/// Addresses of a deployed ERC721N pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc721nDeployment {
    pub reserve_token: Address,
    pub erc721n: DeploymentRecord,
}

impl Erc721nDeployment {
    /// Pick the pair out of the records of an [`erc721n_plan`] run.
    pub fn from_records(reserve: ReserveToken, records: &[DeploymentRecord]) -> Option<Self> {
        let erc721n = records.last()?.clone();
        let reserve_token = match reserve {
            ReserveToken::Existing(address) => address,
            ReserveToken::Deploy => records.first().filter(|_| records.len() == 2)?.address,
        };
        Some(Self {
            reserve_token,
            erc721n,
        })
    }
}

/// Deploy the pair without verification or reporting, as fixtures do.
pub async fn deploy_erc721n<N: Network>(
    ctx: &ExecutionContext<N>,
    artifacts: &ArtifactStore,
    reserve: ReserveToken,
) -> anyhow::Result<Erc721nDeployment> {
    let plan = erc721n_plan(reserve)?;
    let records = Deployer::new(ctx, artifacts).deploy(&plan).await?;

    Erc721nDeployment::from_records(reserve, &records)
        .ok_or_else(|| anyhow::anyhow!("deployment produced {} record(s)", records.len()))
}
