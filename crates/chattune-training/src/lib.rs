//! chattune Training
//!
//! Backend-agnostic primitives for chat fine-tuning runs:
//! - Assembling the run configuration from the environment (`RunConfig`)
//! - Rendering conversations with the chat template and formatting dataset splits
//! - Defining training jobs (`TrainingJobSpec`) with the LoRA recipe
//! - Capability traits for the external collaborators (`DatasetLoader`, `Trainer`, `Exporter`, `Publisher`)
//! - Running the linear fine-tune pipeline and writing run manifests

pub mod artifacts;
pub mod chat;
pub mod config;
pub mod dataset;
pub mod error;
pub mod job;
pub mod layout;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod secret;
pub mod trainer;

pub use artifacts::{
    ArtifactKind, ExportFormat, ExportedModel, PublishReceipt, QuantizationMethod, RunManifest, TrainingArtifact,
    TrainingMetrics,
};
pub use chat::{ChatTemplate, ChatTurn};
pub use config::RunConfig;
pub use dataset::{
    map_split, read_jsonl_split, write_jsonl_split, ChatRecord, DatasetId, DatasetLoader, DatasetSplit,
    JsonlDirLoader, SplitName,
};
pub use error::{TrainingError, TrainingResult};
pub use job::{LoraConfig, ModelSpec, TrainingArgs, TrainingJobId, TrainingJobSpec};
pub use layout::TrainingLayout;
pub use pipeline::FineTunePipeline;
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink, TracingProgressSink};
pub use registry::{discover_runs, find_run, RunEntry};
pub use secret::SecretString;
pub use trainer::{Exporter, Publisher, Trainer, TrainerStatus};
