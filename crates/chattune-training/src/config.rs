//! Run configuration assembled from the process environment.
//!
//! Every value a fine-tuning run needs from the outside world is read exactly
//! once, up front, into an immutable [`RunConfig`]. Nothing else in the crate
//! touches the environment.

use crate::artifacts::QuantizationMethod;
use crate::error::{TrainingError, TrainingResult};
use crate::secret::SecretString;

pub const ENV_INPUT_MODEL: &str = "HF_INPUT_MODEL";
pub const ENV_ACCOUNT: &str = "HF_ACCOUNT";
pub const ENV_DATASET: &str = "HF_DATASET";
pub const ENV_OUTPUT_MODEL: &str = "HF_OUTPUT_MODEL";
pub const ENV_TOKEN: &str = "HF_TOKEN";
pub const ENV_WANDB_PROJECT: &str = "WANDB_PROJECT";
pub const ENV_WANDB_NAME: &str = "WANDB_NAME";

/// Required variables, in the order they are reported when missing.
pub const REQUIRED_ENV: [&str; 5] = [ENV_INPUT_MODEL, ENV_ACCOUNT, ENV_DATASET, ENV_OUTPUT_MODEL, ENV_TOKEN];

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source model identifier (hub repo id or local path understood by the runtime).
    pub input_model: String,
    /// Namespace owning both the dataset and the published model.
    pub account: String,
    pub dataset: String,
    /// Base name for exported and published artifacts.
    pub output_model: String,
    pub token: SecretString,
    /// Experiment-tracking project, forwarded as run metadata.
    pub project: Option<String>,
    /// Experiment-tracking run name, forwarded as run metadata.
    pub run_name: Option<String>,
}

impl RunConfig {
    /// Assemble the configuration from the process environment.
    pub fn from_env() -> TrainingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Assemble the configuration from an arbitrary key lookup.
    ///
    /// Unset and blank values are both treated as missing. All missing keys are
    /// collected so a single error names every one of them.
    pub fn from_lookup<F>(lookup: F) -> TrainingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        let mut require = |key: &'static str| {
            let value = read(key);
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };

        let input_model = require(ENV_INPUT_MODEL);
        let account = require(ENV_ACCOUNT);
        let dataset = require(ENV_DATASET);
        let output_model = require(ENV_OUTPUT_MODEL);
        let token = require(ENV_TOKEN);

        if !missing.is_empty() {
            return Err(TrainingError::MissingEnv(missing));
        }

        Ok(Self {
            input_model,
            account,
            dataset,
            output_model,
            token: SecretString::new(token),
            project: read(ENV_WANDB_PROJECT),
            run_name: read(ENV_WANDB_NAME),
        })
    }

    /// `{account}/{dataset}`
    #[must_use]
    pub fn dataset_id(&self) -> String {
        format!("{}/{}", self.account, self.dataset)
    }

    /// `{account}/{output_model}`, the remote repo both exports are pushed to.
    #[must_use]
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.account, self.output_model)
    }

    #[must_use]
    pub fn merged_dir_name(&self) -> String {
        format!("{}_merged_16bit", self.output_model)
    }

    #[must_use]
    pub fn quantized_dir_name(&self, method: QuantizationMethod) -> String {
        format!("{}_{}", self.output_model, method.as_str())
    }
}
