use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training job spec: {0}")]
    InvalidSpec(String),

    /// One or more required environment variables are unset or blank.
    #[error("missing required environment variable(s): {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("trainer error: {0}")]
    Trainer(String),

    #[error("runtime `{operation}` failed: {message}")]
    Runtime { operation: String, message: String },

    #[error("hub error: {0}")]
    Hub(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
