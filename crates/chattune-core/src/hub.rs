//! Dataset splits from the Hugging Face Hub.
//!
//! Split files are discovered from the dataset repo's file listing rather than
//! guessed, then decoded from Parquet or JSON Lines into records.

use async_trait::async_trait;
use chattune_training::{ChatRecord, DatasetLoader, DatasetSplit, SecretString, SplitName, TrainingError, TrainingResult};
use hf_hub::api::tokio::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::path::{Path, PathBuf};

/// Supported split file encodings, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitFileFormat {
    Parquet,
    JsonLines,
    Json,
}

impl SplitFileFormat {
    const PREFERENCE: [SplitFileFormat; 3] = [Self::Parquet, Self::JsonLines, Self::Json];

    fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "parquet" => Some(Self::Parquet),
            "jsonl" => Some(Self::JsonLines),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Whether a repo file belongs to `split`.
///
/// Matches `train.jsonl`, `data/train-00000-of-00001.parquet`,
/// `train_0.json` and anything below a `train/` directory.
fn belongs_to_split(path: &str, split: SplitName) -> bool {
    let split = split.as_str();
    let p = Path::new(path);

    let in_split_dir = p
        .parent()
        .is_some_and(|parent| parent.components().any(|c| c.as_os_str() == split));
    if in_split_dir {
        return true;
    }

    let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.strip_prefix(split)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|c| matches!(c, '.' | '-' | '_'))
}

/// Pick the files of one split from a repo listing, all in the most preferred format present.
pub fn select_split_files(files: &[String], split: SplitName) -> Vec<(SplitFileFormat, String)> {
    for format in SplitFileFormat::PREFERENCE {
        let mut selected: Vec<String> = files
            .iter()
            .filter(|f| SplitFileFormat::from_path(f) == Some(format) && belongs_to_split(f, split))
            .cloned()
            .collect();
        if !selected.is_empty() {
            selected.sort();
            return selected.into_iter().map(|f| (format, f)).collect();
        }
    }
    Vec::new()
}

fn into_record(value: serde_json::Value, origin: &Path, idx: usize) -> TrainingResult<ChatRecord> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(TrainingError::Dataset(format!(
            "{} row {}: expected an object, found {}",
            origin.display(),
            idx,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

pub fn read_parquet_records(path: &Path) -> TrainingResult<Vec<ChatRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = SerializedFileReader::new(file)
        .map_err(|e| TrainingError::Dataset(format!("{}: {e}", path.display())))?;
    let rows = reader
        .get_row_iter(None)
        .map_err(|e| TrainingError::Dataset(format!("{}: {e}", path.display())))?;

    let mut records = Vec::new();
    for (idx, row) in rows.enumerate() {
        let row = row.map_err(|e| TrainingError::Dataset(format!("{} row {idx}: {e}", path.display())))?;
        records.push(into_record(row.to_json_value(), path, idx)?);
    }
    Ok(records)
}

/// Read a `.json` file holding either one array of records or JSON Lines.
pub fn read_json_records(path: &Path) -> TrainingResult<Vec<ChatRecord>> {
    let contents = std::fs::read_to_string(path)?;
    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(&contents) {
        return items.into_iter().enumerate().map(|(idx, v)| into_record(v, path, idx)).collect();
    }
    read_json_lines(path, &contents)
}

fn read_json_lines(path: &Path, contents: &str) -> TrainingResult<Vec<ChatRecord>> {
    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            TrainingError::Dataset(format!("{}: failed to parse line {}: {}", path.display(), idx + 1, e))
        })?;
        records.push(into_record(value, path, idx)?);
    }
    Ok(records)
}

fn read_split_file(format: SplitFileFormat, path: &Path) -> TrainingResult<Vec<ChatRecord>> {
    match format {
        SplitFileFormat::Parquet => read_parquet_records(path),
        SplitFileFormat::JsonLines => {
            let contents = std::fs::read_to_string(path)?;
            read_json_lines(path, &contents)
        }
        SplitFileFormat::Json => read_json_records(path),
    }
}

/// Loads dataset splits from a Hub dataset repository.
pub struct HubDatasetLoader {
    api: Api,
    revision: Option<String>,
}

impl HubDatasetLoader {
    /// Build a loader, authenticating with `token` when given (needed for private datasets).
    pub fn new(token: Option<&SecretString>) -> TrainingResult<Self> {
        let api = ApiBuilder::new()
            .with_token(token.map(|t| t.expose_secret().to_string()))
            .with_progress(false)
            .build()
            .map_err(|e| TrainingError::Hub(e.to_string()))?;
        Ok(Self { api, revision: None })
    }

    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    fn repo(&self, dataset_id: &str) -> Repo {
        match &self.revision {
            Some(rev) => Repo::with_revision(dataset_id.to_string(), RepoType::Dataset, rev.clone()),
            None => Repo::new(dataset_id.to_string(), RepoType::Dataset),
        }
    }
}

#[async_trait]
impl DatasetLoader for HubDatasetLoader {
    fn id(&self) -> &'static str {
        "hf-hub"
    }

    async fn load_split(&self, dataset_id: &str, split: SplitName) -> TrainingResult<DatasetSplit> {
        let repo = self.api.repo(self.repo(dataset_id));
        let info = repo
            .info()
            .await
            .map_err(|e| TrainingError::Hub(format!("{dataset_id}: {e}")))?;
        let listing: Vec<String> = info.siblings.into_iter().map(|s| s.rfilename).collect();

        let files = select_split_files(&listing, split);
        if files.is_empty() {
            return Err(TrainingError::Dataset(format!(
                "{dataset_id}: no {split} split files found (looked for parquet/jsonl/json)"
            )));
        }

        let mut downloaded: Vec<(SplitFileFormat, PathBuf)> = Vec::with_capacity(files.len());
        for (format, file) in files {
            tracing::debug!(dataset = dataset_id, %split, file = %file, "downloading split file");
            let path = repo
                .get(&file)
                .await
                .map_err(|e| TrainingError::Hub(format!("{dataset_id}/{file}: {e}")))?;
            downloaded.push((format, path));
        }

        let records = tokio::task::spawn_blocking(move || -> TrainingResult<Vec<ChatRecord>> {
            let mut records = Vec::new();
            for (format, path) in &downloaded {
                records.extend(read_split_file(*format, path)?);
            }
            Ok(records)
        })
        .await
        .map_err(|e| TrainingError::Dataset(format!("split decoding task failed: {e}")))??;

        tracing::info!(dataset = dataset_id, %split, records = records.len(), "loaded split from hub");
        Ok(DatasetSplit::new(split, records))
    }
}
