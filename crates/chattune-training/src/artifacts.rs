use crate::dataset::DatasetId;
use crate::error::{TrainingError, TrainingResult};
use crate::job::{ModelSpec, TrainingJobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// GGUF quantization recipes understood by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMethod {
    Q4KM,
    Q5KM,
    Q8_0,
    F16,
}

impl QuantizationMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Q4KM => "q4_k_m",
            Self::Q5KM => "q5_k_m",
            Self::Q8_0 => "q8_0",
            Self::F16 => "f16",
        }
    }
}

impl Default for QuantizationMethod {
    fn default() -> Self {
        Self::Q4KM
    }
}

impl std::fmt::Display for QuantizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuantizationMethod {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "q4_k_m" => Ok(Self::Q4KM),
            "q5_k_m" => Ok(Self::Q5KM),
            "q8_0" => Ok(Self::Q8_0),
            "f16" => Ok(Self::F16),
            other => Err(TrainingError::InvalidSpec(format!("unknown quantization method: {other}"))),
        }
    }
}

/// Representation an exported model was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ExportFormat {
    /// Adapters merged into the base weights, saved at 16-bit precision.
    Merged16Bit,
    Gguf { quantization: QuantizationMethod },
}

impl ExportFormat {
    /// Tag the runtime uses for the save method.
    #[must_use]
    pub fn save_method(&self) -> &'static str {
        match self {
            Self::Merged16Bit => "merged_16bit",
            Self::Gguf { quantization } => quantization.as_str(),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged16Bit => f.write_str("merged_16bit"),
            Self::Gguf { quantization } => write!(f, "gguf/{quantization}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedModel {
    pub format: ExportFormat,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub repo_id: String,
    pub format: ExportFormat,
    /// Revision or URL reported by the registry, when it reports one.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    MergedModel,
    QuantizedModel,
    DatasetJsonl,
    Checkpoint,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TrainingMetrics {
    pub train_loss: Option<f64>,
    pub eval_loss: Option<f64>,
    pub steps: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub base_model: ModelSpec,
    /// Hub dataset the run was trained on.
    pub dataset: String,
    /// Hash of the formatted splits.
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub metrics: TrainingMetrics,
    pub artifacts: Vec<TrainingArtifact>,
    #[serde(default)]
    pub publications: Vec<PublishReceipt>,
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file, or every file under a directory in path order.
pub fn sha256_path(path: &Path) -> TrainingResult<String> {
    if path.is_file() {
        return sha256_file(path);
    }

    let mut hasher = Sha256::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| TrainingError::Artifact(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(path).unwrap_or(entry.path());
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(std::fs::read(entry.path())?);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.exists() {
        return Err(TrainingError::Artifact(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }

    let hash = sha256_path(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}
