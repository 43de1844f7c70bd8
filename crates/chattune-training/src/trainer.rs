use crate::artifacts::{ExportedModel, PublishReceipt, QuantizationMethod, TrainingMetrics};
use crate::error::TrainingResult;
use crate::job::{TrainingJobId, TrainingJobSpec};
use crate::progress::ProgressSink;
use crate::secret::SecretString;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainerStatus {
    Idle,
    Preparing,
    Running,
    Finished,
    Failed(String),
    Cancelled,
}

/// Owns the model for the duration of a job.
///
/// `prepare` loads the quantized base model and tokenizer, installs the chat
/// template and attaches the adapters. `run` blocks for the whole optimization
/// loop, including periodic checkpointing and evaluation.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn prepare(&self, job: &TrainingJobSpec) -> TrainingResult<()>;

    async fn run(&self, job: &TrainingJobSpec, progress: &dyn ProgressSink) -> TrainingResult<TrainingMetrics>;

    async fn status(&self, job_id: &TrainingJobId) -> TrainingResult<TrainerStatus>;

    async fn cancel(&self, job_id: &TrainingJobId) -> TrainingResult<()>;
}

/// Writes the trained model of a job to disk.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Merge adapters into the base weights and save at 16-bit precision.
    async fn export_merged(&self, job: &TrainingJobSpec, dir: &Path) -> TrainingResult<ExportedModel>;

    /// Save a quantized GGUF file set.
    async fn export_quantized(
        &self,
        job: &TrainingJobSpec,
        dir: &Path,
        method: QuantizationMethod,
    ) -> TrainingResult<ExportedModel>;
}

/// Pushes exported models to a remote model registry.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        job: &TrainingJobSpec,
        model: &ExportedModel,
        repo_id: &str,
        token: &SecretString,
    ) -> TrainingResult<PublishReceipt>;
}
