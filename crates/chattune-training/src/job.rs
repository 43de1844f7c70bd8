use crate::chat::ChatTemplate;
use crate::config::RunConfig;
use crate::dataset::{SplitName, TEXT_FIELD};
use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Pre-quantized base model to fine-tune.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Hub repo id or a path the runtime can load.
    pub model_id: String,
    pub load_in_4bit: bool,
    /// `None` lets the runtime pick the dtype.
    pub dtype: Option<String>,
}

impl ModelSpec {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self { model_id: model_id.into(), load_in_4bit: true, dtype: None }
    }
}

pub const DEFAULT_TARGET_MODULES: [&str; 7] =
    ["q_proj", "k_proj", "v_proj", "o_proj", "gate_proj", "up_proj", "down_proj"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraBias {
    None,
    All,
    LoraOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientCheckpointing {
    Disabled,
    Enabled,
    /// Offloaded checkpointing variant for very long contexts.
    Unsloth,
}

/// Adapter injection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    pub rank: u32,
    pub alpha: u32,
    pub dropout: f64,
    pub bias: LoraBias,
    pub target_modules: Vec<String>,
    pub gradient_checkpointing: GradientCheckpointing,
    pub random_state: u64,
    pub use_rslora: bool,
    pub loftq: bool,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            rank: 16,
            alpha: 16,
            dropout: 0.0,
            bias: LoraBias::None,
            target_modules: DEFAULT_TARGET_MODULES.iter().map(|m| (*m).to_string()).collect(),
            gradient_checkpointing: GradientCheckpointing::Unsloth,
            random_state: 3407,
            use_rslora: false,
            loftq: false,
        }
    }
}

impl LoraConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.rank == 0 {
            return Err(TrainingError::InvalidSpec("lora.rank must be >= 1".to_string()));
        }
        if self.alpha == 0 {
            return Err(TrainingError::InvalidSpec("lora.alpha must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainingError::InvalidSpec("lora.dropout must be in [0, 1)".to_string()));
        }
        if self.target_modules.is_empty() || self.target_modules.iter().any(|m| m.trim().is_empty()) {
            return Err(TrainingError::InvalidSpec("lora.target_modules must be non-empty names".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// bf16 when the accelerator supports it, fp16 otherwise.
    Auto,
    Bf16,
    Fp16,
    Fp32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArgs {
    pub epochs: u32,
    pub per_device_train_batch_size: u32,
    pub gradient_accumulation_steps: u32,
    pub warmup_steps: u32,
    pub learning_rate: f64,
    pub precision: Precision,
    pub optimizer: String,
    pub seed: u64,
    pub logging_steps: u32,
    /// Checkpoint every N optimizer steps.
    pub save_steps: u32,
    /// Evaluate on the test split every N optimizer steps.
    pub eval_steps: u32,
    pub output_dir: PathBuf,
    pub run_name: Option<String>,
    pub project: Option<String>,
}

impl Default for TrainingArgs {
    fn default() -> Self {
        Self {
            epochs: 1,
            per_device_train_batch_size: 16,
            gradient_accumulation_steps: 32,
            warmup_steps: 10,
            learning_rate: 5e-5,
            precision: Precision::Auto,
            optimizer: "adamw_8bit".to_string(),
            seed: 3407,
            logging_steps: 1,
            save_steps: 40,
            eval_steps: 20,
            output_dir: PathBuf::from("outputs"),
            run_name: None,
            project: None,
        }
    }
}

impl TrainingArgs {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidSpec("epochs must be >= 1".to_string()));
        }
        if !(self.learning_rate.is_finite()) || self.learning_rate <= 0.0 {
            return Err(TrainingError::InvalidSpec("learning_rate must be > 0".to_string()));
        }
        if self.per_device_train_batch_size == 0 {
            return Err(TrainingError::InvalidSpec("per_device_train_batch_size must be >= 1".to_string()));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(TrainingError::InvalidSpec("gradient_accumulation_steps must be >= 1".to_string()));
        }
        if self.save_steps == 0 || self.eval_steps == 0 || self.logging_steps == 0 {
            return Err(TrainingError::InvalidSpec("save/eval/logging steps must be >= 1".to_string()));
        }
        if self.optimizer.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("optimizer is required".to_string()));
        }
        Ok(())
    }

    /// Samples consumed per optimizer step.
    #[must_use]
    pub fn effective_batch_size(&self) -> u64 {
        u64::from(self.per_device_train_batch_size) * u64::from(self.gradient_accumulation_steps)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJobSpec {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub base_model: ModelSpec,
    /// `{account}/{dataset}` on the hub.
    pub dataset_id: String,
    pub template: ChatTemplate,
    pub text_field: String,
    pub max_seq_len: u32,
    pub lora: LoraConfig,
    pub args: TrainingArgs,
    /// Formatted split files, filled in once the dataset has been prepared.
    #[serde(default)]
    pub dataset_files: BTreeMap<SplitName, PathBuf>,
}

impl TrainingJobSpec {
    #[must_use]
    pub fn new(base_model: ModelSpec, dataset_id: impl Into<String>) -> Self {
        Self {
            job_id: TrainingJobId::new(),
            created_at: Utc::now(),
            base_model,
            dataset_id: dataset_id.into(),
            template: ChatTemplate::llama3(),
            text_field: TEXT_FIELD.to_string(),
            max_seq_len: 2048,
            lora: LoraConfig::default(),
            args: TrainingArgs::default(),
            dataset_files: BTreeMap::new(),
        }
    }

    /// Job with the fixed fine-tuning recipe for a configured run.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        let mut job = Self::new(ModelSpec::new(config.input_model.clone()), config.dataset_id());
        job.args.run_name = config.run_name.clone();
        job.args.project = config.project.clone();
        job
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.base_model.model_id.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("base_model.model_id is required".to_string()));
        }
        if self.dataset_id.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("dataset_id is required".to_string()));
        }
        if self.text_field.trim().is_empty() {
            return Err(TrainingError::InvalidSpec("text_field is required".to_string()));
        }
        if self.max_seq_len == 0 {
            return Err(TrainingError::InvalidSpec("max_seq_len must be >= 1".to_string()));
        }
        self.lora.validate()?;
        self.args.validate()?;
        Ok(())
    }

    /// The runtime needs both formatted splits before it can train.
    pub fn require_dataset_files(&self) -> TrainingResult<()> {
        for split in SplitName::ALL {
            if !self.dataset_files.contains_key(&split) {
                return Err(TrainingError::InvalidSpec(format!("{split} dataset file has not been prepared")));
            }
        }
        Ok(())
    }
}
