//! Ordered deployment plans.
//!
//! A plan is validated when it is built: constructor arguments may only
//! reference specs that come strictly earlier, so the deployer never meets an
//! unresolved address at runtime.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, keccak256},
};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::PlanError;

/// Position of a spec within its plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("#{_0}")]
pub struct SpecRef(pub usize);

impl SpecRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A constructor argument: a literal ABI value, or the address of an earlier deployment.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructorArg {
    Literal(DynSolValue),
    Reference(SpecRef),
}

impl ConstructorArg {
    pub fn literal(value: impl Into<DynSolValue>) -> Self {
        Self::Literal(value.into())
    }
}

impl From<SpecRef> for ConstructorArg {
    fn from(reference: SpecRef) -> Self {
        Self::Reference(reference)
    }
}

impl From<Address> for ConstructorArg {
    fn from(address: Address) -> Self {
        Self::Literal(DynSolValue::Address(address))
    }
}

impl From<DynSolValue> for ConstructorArg {
    fn from(value: DynSolValue) -> Self {
        Self::Literal(value)
    }
}

/// One contract to deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentSpec {
    pub artifact: String,
    pub args: Vec<ConstructorArg>,
    /// Explicit gas limit; estimated by the network when `None`.
    pub gas_limit: Option<u64>,
}

impl DeploymentSpec {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            args: Vec::new(),
            gas_limit: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<ConstructorArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Specs this one depends on, in argument order.
    pub fn references(&self) -> impl Iterator<Item = SpecRef> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            ConstructorArg::Reference(reference) => Some(*reference),
            ConstructorArg::Literal(_) => None,
        })
    }
}

/// The address a getter is expected to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedAddress {
    /// The address of a spec deployed by the same plan.
    Deployed(SpecRef),
    Fixed(Address),
}

impl From<SpecRef> for ExpectedAddress {
    fn from(reference: SpecRef) -> Self {
        Self::Deployed(reference)
    }
}

impl From<Address> for ExpectedAddress {
    fn from(address: Address) -> Self {
        Self::Fixed(address)
    }
}

/// Post-deployment check: calling `getter` on `contract` must return `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCheck {
    pub contract: SpecRef,
    /// Full function signature, e.g. `getReserveTokenAddress()`.
    pub getter: String,
    pub expected: ExpectedAddress,
}

impl AddressCheck {
    /// Calldata for the getter: its 4-byte selector.
    pub fn calldata(&self) -> Bytes {
        Bytes::copy_from_slice(&keccak256(self.getter.as_bytes())[..4])
    }
}

/// A validated, ordered list of deployments.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentPlan {
    specs: Vec<DeploymentSpec>,
    checks: Vec<AddressCheck>,
}

impl DeploymentPlan {
    pub fn new(specs: Vec<DeploymentSpec>) -> Result<Self, PlanError> {
        Self::validated(specs, Vec::new())
    }

    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn specs(&self) -> &[DeploymentSpec] {
        &self.specs
    }

    pub fn checks(&self) -> &[AddressCheck] {
        &self.checks
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn validated(specs: Vec<DeploymentSpec>, checks: Vec<AddressCheck>) -> Result<Self, PlanError> {
        if specs.is_empty() {
            return Err(PlanError::Empty);
        }

        for (index, spec) in specs.iter().enumerate() {
            if let Some(target) = spec.references().find(|target| target.0 >= index) {
                return Err(PlanError::ForwardReference {
                    index,
                    artifact: spec.artifact.clone(),
                    target: target.0,
                });
            }
        }

        let len = specs.len();
        for check in &checks {
            let mut targets = vec![check.contract];
            if let ExpectedAddress::Deployed(reference) = check.expected {
                targets.push(reference);
            }
            if let Some(target) = targets.into_iter().find(|target| target.0 >= len) {
                return Err(PlanError::UnknownCheckTarget {
                    target: target.0,
                    len,
                });
            }
        }

        Ok(Self { specs, checks })
    }
}

/// Builds a plan while handing out references to already-pushed specs only.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    specs: Vec<DeploymentSpec>,
    checks: Vec<AddressCheck>,
}

impl PlanBuilder {
    /// Append a spec and return a reference to its future address.
    pub fn deploy(&mut self, spec: DeploymentSpec) -> SpecRef {
        self.specs.push(spec);
        SpecRef(self.specs.len() - 1)
    }

    pub fn expect_address(
        &mut self,
        contract: SpecRef,
        getter: impl Into<String>,
        expected: impl Into<ExpectedAddress>,
    ) -> &mut Self {
        self.checks.push(AddressCheck {
            contract,
            getter: getter.into(),
            expected: expected.into(),
        });
        self
    }

    pub fn build(self) -> Result<DeploymentPlan, PlanError> {
        DeploymentPlan::validated(self.specs, self.checks)
    }
}
