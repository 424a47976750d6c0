use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use virial_core::{ErrorInfo, VirialError};

use crate::config::RunConfig;
use crate::kernel::VirialResult;

/// Structured record of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Master seed used to derive the ensemble substreams.
    pub master_seed: u64,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// SHA-256 of the canonical configuration JSON.
    pub config_hash: String,
    /// RFC 3339 time the manifest was built.
    pub created_at: String,
    /// Final estimates.
    pub result: VirialResult,
}

/// Hex SHA-256 of the configuration serialized as JSON.
pub fn config_hash(config: &RunConfig) -> Result<String, VirialError> {
    let json = serde_json::to_vec(config).map_err(|err| {
        VirialError::Configuration(ErrorInfo::new("config-serialize", err.to_string()))
    })?;
    let digest = Sha256::digest(&json);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

impl RunManifest {
    /// Manifest for `result` produced under `config`, stamped now.
    pub fn new(config: &RunConfig, result: VirialResult) -> Self {
        Self {
            config: config.clone(),
            master_seed: config.seed_policy.master_seed,
            seed_label: config.seed_policy.label.clone(),
            config_hash: result.config_hash.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            result,
        }
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), VirialError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                VirialError::Checkpoint(
                    ErrorInfo::new("manifest-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            VirialError::Checkpoint(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            VirialError::Checkpoint(
                ErrorInfo::new("manifest-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, VirialError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            VirialError::Checkpoint(
                ErrorInfo::new("manifest-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            VirialError::Checkpoint(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}
