//! erc721n-deploy - Deployment pipeline and fixture harness for the ERC721N contracts.
//!
//! The pipeline reads the target network's identity, deploys a plan of
//! contracts in dependency order, reports what it cost, and verifies the
//! result. The fixture cache reuses a deployment across tests through network
//! snapshots.
//!
//! Everything runs against an explicit [`ExecutionContext`]: a JSON-RPC
//! endpoint in production, or an [`InMemoryNetwork`] in unit tests.

mod error;
pub use error::{
    DeployError, DeploymentFailed, FixtureError, PipelineError, PlanError, VerificationError,
};

pub mod network;
pub use network::{
    Account, Checkpoint, DEV_ACCOUNT, DEV_CHAIN_ID, DeploymentRequest, ExecutionContext,
    InMemoryNetwork, JsonRpcNetwork, Network, NetworkIdentity, SnapshotId, TransactionReceipt,
};

pub mod rpc;
pub mod signer;

mod artifact;
pub use artifact::{Artifact, ArtifactStore};

mod plan;
pub use plan::{
    AddressCheck, ConstructorArg, DeploymentPlan, DeploymentSpec, ExpectedAddress, PlanBuilder,
    SpecRef,
};

mod context;
pub use context::{read_account, read_context};

mod confirmation;
pub use confirmation::{Confirmation, await_confirmation, with_timeout};

mod deployer;
pub use deployer::{Deployer, DeploymentRecord};

mod report;
pub use report::{Summary, format_ether, report};

mod verify;
pub use verify::verify;

mod fixture;
pub use fixture::{FixtureCache, FixtureKey};

pub mod erc721n;
pub use erc721n::{Erc721nDeployment, ReserveToken, deploy_erc721n, erc721n_plan};

mod pipeline;
pub use pipeline::{PipelineOptions, run_pipeline};

pub mod config;
pub use config::{DeployConfig, NetworkConfig, PrivateKey};

pub mod anvil;
pub use anvil::{AnvilCmdBuilder, AnvilInstance};
