//! Deployment cost and outcome summary.

use std::{fmt, path::Path};

use alloy_core::primitives::{Address, I256, U256};
use anyhow::Context;
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use serde::{Deserialize, Serialize};

use crate::{Account, DeploymentRecord, NetworkIdentity};

/// Wei per ether.
const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// Outcome of a deployment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkIdentity>,
    pub deployer: Address,
    pub balance_before: U256,
    pub balance_after: U256,
    /// `balance_before - balance_after`, in wei. Negative means the account
    /// gained funds during the run.
    pub cost: I256,
    pub records: Vec<DeploymentRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Summary {
    pub fn with_network(mut self, network: NetworkIdentity) -> Self {
        self.network = Some(network);
        self
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Write the summary as TOML.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize deployment summary")?;
        std::fs::write(path, content)
            .context(format!("Failed to write summary to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Deployment summary saved");
        Ok(())
    }
}

/// Build the summary of a run from the balances around it.
pub fn report(before: &Account, after: &Account, records: &[DeploymentRecord]) -> Summary {
    let cost = signed_difference(before.balance, after.balance);
    let mut warnings = Vec::new();

    if cost.is_negative() {
        let warning = format!(
            "deployer balance increased by {} wei during deployment; cost accounting is unreliable",
            cost.unsigned_abs()
        );
        tracing::warn!(%cost, "{warning}");
        warnings.push(warning);
    }

    if before.address != after.address {
        let warning = format!(
            "balances were read for different accounts ({} before, {} after)",
            before.address, after.address
        );
        tracing::warn!("{warning}");
        warnings.push(warning);
    }

    Summary {
        network: None,
        deployer: before.address,
        balance_before: before.balance,
        balance_after: after.balance,
        cost,
        records: records.to_vec(),
        warnings,
        generated_at: Utc::now(),
    }
}

fn signed_difference(before: U256, after: U256) -> I256 {
    if before >= after {
        I256::try_from(before - after).unwrap_or(I256::MAX)
    } else {
        I256::try_from(after - before)
            .map(|gain| -gain)
            .unwrap_or(I256::MIN)
    }
}

/// Render a wei amount as ether, trimming trailing zeros.
pub fn format_ether(wei: I256) -> String {
    let sign = if wei.is_negative() { "-" } else { "" };
    let abs = wei.unsigned_abs();
    let unit = U256::from(WEI_PER_ETHER);

    let whole = abs / unit;
    let fraction = (abs % unit).saturating_to::<u64>();
    let fraction = format!("{fraction:018}");
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        format!("{sign}{whole} ETH")
    } else {
        format!("{sign}{whole}.{fraction} ETH")
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(network) = &self.network {
            writeln!(f, "Network:  {} (chain id {})", network.name, network.chain_id)?;
        }
        writeln!(f, "Deployer: {}", self.deployer)?;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED).set_header(vec![
            "#",
            "Artifact",
            "Address",
            "Transaction",
            "Gas used",
            "Block",
        ]);
        for (index, record) in self.records.iter().enumerate() {
            table.add_row(vec![
                index.to_string(),
                record.artifact.clone(),
                record.address.to_string(),
                record.tx_hash.to_string(),
                record.gas_used.to_string(),
                record.block_number.to_string(),
            ]);
        }
        writeln!(f, "{table}")?;

        write!(f, "Total cost: {} wei ({})", self.cost, format_ether(self.cost))?;
        for warning in &self.warnings {
            write!(f, "\nwarning: {warning}")?;
        }
        Ok(())
    }
}
