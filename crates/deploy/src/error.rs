//! Error taxonomy for the deployment pipeline and the fixture harness.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

use crate::{DeploymentRecord, FixtureKey, SnapshotId, Summary};

/// Failure of a single network-facing step.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The endpoint could not be queried at all.
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    /// No private key or node-managed account is configured for the network.
    #[error("no signer configured for network '{network}'")]
    NoSignerConfigured { network: String },

    /// The endpoint reports a different chain than the one configured.
    #[error("chain id mismatch: expected {expected}, endpoint reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    /// The endpoint answered with a JSON-RPC error object.
    #[error("RPC error from {method} ({code}): {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// The endpoint answered with something that is not a valid result.
    #[error("invalid {method} response: {reason}")]
    InvalidResponse { method: String, reason: String },

    /// The deployment transaction was included but failed.
    #[error("deployment transaction {tx_hash} reverted")]
    DeploymentReverted { tx_hash: B256 },

    /// An external timeout elapsed before the transaction was confirmed.
    #[error("transaction {tx_hash} not confirmed after {elapsed:?}")]
    ConfirmationTimeout { tx_hash: B256, elapsed: Duration },

    #[error("artifact '{0}' not found")]
    ArtifactNotFound(String),

    #[error("cannot read artifacts from {}: {source}", .path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact '{name}': {reason}")]
    InvalidArtifact { name: String, reason: String },

    /// Constructor arguments could not be resolved or encoded.
    #[error("cannot encode constructor arguments for '{artifact}': {reason}")]
    Encoding { artifact: String, reason: String },

    #[error("failed to sign transaction: {0}")]
    Signing(String),

    /// The network refused to revert to a snapshot handle.
    #[error("snapshot {0} was rejected by the network")]
    SnapshotRejected(SnapshotId),
}

impl DeployError {
    /// Whether retrying the same read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_))
    }
}

/// A deployment sequence stopped at `index`.
///
/// `completed` holds every record confirmed before the failing spec, in plan
/// order. Nothing is rolled back.
#[derive(Debug, Error)]
#[error(
    "deployment #{index} ({artifact}) failed after {} confirmed deployment(s): {cause}",
    .completed.len()
)]
pub struct DeploymentFailed {
    pub index: usize,
    pub artifact: String,
    #[source]
    pub cause: DeployError,
    pub completed: Vec<DeploymentRecord>,
}

/// Invalid deployment plan, detected before anything is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("deployment plan is empty")]
    Empty,

    #[error(
        "spec #{index} ({artifact}) references spec #{target}, which is not deployed before it"
    )]
    ForwardReference {
        index: usize,
        artifact: String,
        target: usize,
    },

    #[error("verification check references spec #{target}, but the plan only has {len} spec(s)")]
    UnknownCheckTarget { target: usize, len: usize },
}

/// Post-deployment verification failure.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{artifact} at {address} has no code")]
    MissingCode { artifact: String, address: Address },

    #[error("{artifact}.{getter} returned {actual}, expected {expected}")]
    AddressMismatch {
        artifact: String,
        getter: String,
        expected: Address,
        actual: Address,
    },

    /// A check refers to a spec that has no record.
    #[error("no deployment record for spec #{0}")]
    MissingRecord(usize),

    #[error("{artifact}.{getter} did not return an address: {reason}")]
    UndecodableResult {
        artifact: String,
        getter: String,
        reason: String,
    },

    #[error("verification query failed: {0}")]
    Query(#[from] DeployError),
}

/// Failure of the fixture harness.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Reported when a cached snapshot cannot be restored. The entry is dropped.
    #[error("failed to restore snapshot for fixture {key}: {source}")]
    SnapshotRestoreFailed {
        key: FixtureKey,
        #[source]
        source: DeployError,
    },

    #[error("failed to capture snapshot for fixture {key}: {source}")]
    SnapshotCaptureFailed {
        key: FixtureKey,
        #[source]
        source: DeployError,
    },

    #[error("fixture {key} setup failed: {source}")]
    Setup {
        key: FixtureKey,
        #[source]
        source: anyhow::Error,
    },

    /// A named fixture was loaded with a different result type than it was cached with.
    #[error("fixture {key} was cached with a different result type")]
    TypeMismatch { key: FixtureKey },
}

/// Failure of the end-to-end pipeline, identifying the failing stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read network context: {0}")]
    Context(#[source] DeployError),

    #[error(transparent)]
    Deployment(#[from] DeploymentFailed),

    #[error("failed to read deployer balance after {} deployment(s): {source}", .completed.len())]
    Balance {
        #[source]
        source: DeployError,
        completed: Vec<DeploymentRecord>,
    },

    #[error("deployment verification failed: {source}")]
    Verification {
        #[source]
        source: VerificationError,
        summary: Box<Summary>,
    },
}

impl PipelineError {
    /// Records confirmed before the pipeline stopped.
    pub fn completed(&self) -> &[DeploymentRecord] {
        match self {
            Self::Context(_) => &[],
            Self::Deployment(failed) => &failed.completed,
            Self::Balance { completed, .. } => completed,
            Self::Verification { summary, .. } => &summary.records,
        }
    }
}
