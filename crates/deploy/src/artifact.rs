//! Compiled contract artifacts.
//!
//! Artifacts are opaque `{bytecode, abi}` pairs identified by contract name.
//! Both Hardhat (`"bytecode": "0x.."`) and Foundry (`"bytecode": {"object": "0x.."}`)
//! output layouts are understood.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy_core::{dyn_abi::DynSolType, primitives::Bytes};
use serde::Deserialize;
use serde_json::Value;

use crate::DeployError;

/// Directory names that never contain contract artifacts.
const SKIPPED_DIRS: &[&str] = &["build-info", "cache"];

/// A deployable contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// JSON ABI as emitted by the compiler.
    pub abi: Value,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytecode: Bytes, abi: Value) -> Self {
        Self {
            name: name.into(),
            bytecode,
            abi,
        }
    }

    /// Constructor parameter types, empty when the ABI declares no constructor.
    pub fn constructor_types(&self) -> Result<Vec<DynSolType>, DeployError> {
        let Some(entries) = self.abi.as_array() else {
            return Ok(Vec::new());
        };

        let Some(constructor) = entries
            .iter()
            .find(|entry| entry.get("type").and_then(Value::as_str) == Some("constructor"))
        else {
            return Ok(Vec::new());
        };

        constructor
            .get("inputs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|input| {
                let ty = input
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                DynSolType::parse(ty).map_err(|e| DeployError::InvalidArtifact {
                    name: self.name.clone(),
                    reason: format!("constructor input type '{ty}': {e}"),
                })
            })
            .collect()
    }

    fn from_json(name: &str, content: &str) -> Result<Self, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            name: name.to_string(),
            reason,
        };

        let file: ArtifactFile = serde_json::from_str(content)
            .map_err(|e| invalid(e.to_string()))?;

        let hex = match &file.bytecode {
            BytecodeField::Hex(hex) => hex.as_str(),
            BytecodeField::Object { object } => object.as_str(),
        };
        let bytecode: Bytes = hex
            .parse()
            .map_err(|e| invalid(format!("bytecode is not hex: {e}")))?;

        if bytecode.is_empty() {
            return Err(invalid(
                "empty bytecode (abstract contract or interface)".to_string(),
            ));
        }

        Ok(Self::new(name, bytecode, file.abi))
    }
}

#[derive(Deserialize)]
struct ArtifactFile {
    #[serde(default)]
    abi: Value,
    bytecode: BytecodeField,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(String),
    Object { object: String },
}

#[derive(Debug, Clone)]
enum Entry {
    File(PathBuf),
    Loaded(Artifact),
}

/// Name-indexed artifact lookup.
///
/// Files are indexed on construction and parsed on first use, so unrelated
/// broken artifacts in the same output directory do not fail a deployment.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    entries: BTreeMap<String, Entry>,
}

impl ArtifactStore {
    /// Index every `<Name>.json` under `dir`, recursively.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, DeployError> {
        let mut store = Self::default();
        store.index_dir(dir.as_ref())?;

        tracing::debug!(
            dir = %dir.as_ref().display(),
            artifacts = store.entries.len(),
            "Indexed contract artifacts"
        );

        Ok(store)
    }

    pub fn from_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        Self {
            entries: artifacts
                .into_iter()
                .map(|artifact| (artifact.name.clone(), Entry::Loaded(artifact)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<Artifact, DeployError> {
        match self.entries.get(name) {
            Some(Entry::Loaded(artifact)) => Ok(artifact.clone()),
            Some(Entry::File(path)) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| DeployError::ArtifactIo {
                        path: path.clone(),
                        source,
                    })?;
                Artifact::from_json(name, &content)
            }
            None => Err(DeployError::ArtifactNotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index_dir(&mut self, dir: &Path) -> Result<(), DeployError> {
        let io_err = |source| DeployError::ArtifactIo {
            path: dir.to_path_buf(),
            source,
        };

        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();

            if path.is_dir() {
                if !SKIPPED_DIRS.contains(&file_name) {
                    self.index_dir(&path)?;
                }
                continue;
            }

            // Hardhat writes `<Name>.dbg.json` debug files next to each artifact.
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            if name.ends_with(".dbg") {
                continue;
            }

            if let Some(Entry::File(existing)) = self.entries.get(name) {
                tracing::warn!(
                    artifact = name,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "Duplicate artifact name"
                );
                continue;
            }
            self.entries.insert(name.to_string(), Entry::File(path));
        }

        Ok(())
    }
}
