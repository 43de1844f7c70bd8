use crate::chat::{ChatTemplate, ChatTurn};
use crate::error::{TrainingError, TrainingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Field holding the conversation in every source record.
pub const CHATS_FIELD: &str = "chats";
/// Field added by [`map_split`] with the rendered conversation.
pub const TEXT_FIELD: &str = "text";

/// Stable identifier for a formatted dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

/// A dataset record. Arbitrary JSON object; must carry a `chats` array to be formatted.
pub type ChatRecord = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitName {
    Train,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 2] = [SplitName::Train, SplitName::Test];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for SplitName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    pub name: SplitName,
    pub records: Vec<ChatRecord>,
}

impl DatasetSplit {
    #[must_use]
    pub fn new(name: SplitName, records: Vec<ChatRecord>) -> Self {
        Self { name, records }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Source of raw dataset splits.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    fn id(&self) -> &'static str;

    async fn load_split(&self, dataset_id: &str, split: SplitName) -> TrainingResult<DatasetSplit>;
}

/// Extract the turns of one record.
pub fn record_turns(record: &ChatRecord) -> Result<Vec<ChatTurn>, String> {
    let chats = record.get(CHATS_FIELD).ok_or_else(|| format!("missing `{CHATS_FIELD}` field"))?;
    serde_json::from_value(chats.clone()).map_err(|e| format!("malformed `{CHATS_FIELD}`: {e}"))
}

/// Render every record of a split through `template`, adding a `text` field.
///
/// Original fields are kept and record order is preserved. The first malformed
/// record fails the whole split.
pub fn map_split(split: DatasetSplit, template: &ChatTemplate) -> TrainingResult<DatasetSplit> {
    let name = split.name;
    let records = split
        .records
        .into_iter()
        .enumerate()
        .map(|(idx, mut record)| {
            let turns = record_turns(&record)
                .map_err(|e| TrainingError::Dataset(format!("{name} record[{idx}]: {e}")))?;
            if turns.is_empty() {
                tracing::warn!(split = %name, record = idx, "record has an empty conversation");
            }
            record.insert(TEXT_FIELD.to_string(), serde_json::Value::String(template.format(&turns)));
            Ok(record)
        })
        .collect::<TrainingResult<Vec<_>>>()?;

    tracing::debug!(split = %name, records = records.len(), "formatted split");
    Ok(DatasetSplit { name, records })
}

pub fn compute_dataset_id(splits: &[DatasetSplit]) -> TrainingResult<DatasetId> {
    let mut hasher = Sha256::new();

    for split in splits {
        hasher.update(split.name.as_str().as_bytes());
        hasher.update(b"\n");
        for record in &split.records {
            let bytes = serde_json::to_vec(record)?;
            hasher.update(bytes);
            hasher.update(b"\n");
        }
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

pub fn write_jsonl_split(path: &Path, split: &DatasetSplit) -> TrainingResult<()> {
    let mut out = String::new();
    for record in &split.records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub fn read_jsonl_split(path: &Path, name: SplitName) -> TrainingResult<DatasetSplit> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ChatRecord = serde_json::from_str(line).map_err(|e| {
            TrainingError::Dataset(format!("{}: failed to parse jsonl line {}: {}", path.display(), idx + 1, e))
        })?;
        records.push(record);
    }

    Ok(DatasetSplit { name, records })
}

/// Loads `{dir}/{split}.jsonl`, ignoring the dataset id.
#[derive(Debug, Clone)]
pub struct JsonlDirLoader {
    dir: PathBuf,
}

impl JsonlDirLoader {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn split_path(&self, split: SplitName) -> PathBuf {
        self.dir.join(format!("{split}.jsonl"))
    }
}

#[async_trait]
impl DatasetLoader for JsonlDirLoader {
    fn id(&self) -> &'static str {
        "jsonl-dir"
    }

    async fn load_split(&self, _dataset_id: &str, split: SplitName) -> TrainingResult<DatasetSplit> {
        let path = self.split_path(split);
        if !path.exists() {
            return Err(TrainingError::Dataset(format!("split file not found: {}", path.display())));
        }
        read_jsonl_split(&path, split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: serde_json::Value) -> ChatRecord {
        value.as_object().cloned().unwrap()
    }

    fn sample_split(name: SplitName) -> DatasetSplit {
        DatasetSplit::new(
            name,
            vec![
                record(json!({"id": 1, "chats": [{"role": "user", "content": " hi "}]})),
                record(json!({"id": 2, "chats": [
                    {"role": "user", "content": "a"},
                    {"role": "assistant", "content": "b"}
                ]})),
                record(json!({"id": 3, "chats": []})),
            ],
        )
    }

    #[test]
    fn test_map_split_preserves_order_count_and_fields() {
        let template = ChatTemplate::with_markers("<bos>", "<eos>");
        for name in SplitName::ALL {
            let mapped = map_split(sample_split(name), &template).unwrap();
            assert_eq!(mapped.name, name);
            assert_eq!(mapped.len(), 3);

            let ids: Vec<_> = mapped.records.iter().map(|r| r["id"].as_i64().unwrap()).collect();
            assert_eq!(ids, vec![1, 2, 3]);
            assert!(mapped.records.iter().all(|r| r.contains_key(CHATS_FIELD)));
            assert_eq!(
                mapped.records[0][TEXT_FIELD],
                "<bos><|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|><eos>"
            );
            assert_eq!(mapped.records[2][TEXT_FIELD], "<bos><eos>");
        }
    }

    #[test]
    fn test_map_split_is_pure() {
        let template = ChatTemplate::llama3();
        let a = map_split(sample_split(SplitName::Train), &template).unwrap();
        let b = map_split(sample_split(SplitName::Train), &template).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_map_split_fails_on_missing_chats() {
        let split = DatasetSplit::new(
            SplitName::Test,
            vec![
                record(json!({"chats": [{"role": "user", "content": "ok"}]})),
                record(json!({"messages": []})),
            ],
        );
        let err = map_split(split, &ChatTemplate::llama3()).unwrap_err().to_string();
        assert!(err.contains("test record[1]"), "{err}");
        assert!(err.contains("missing `chats`"), "{err}");
    }

    #[test]
    fn test_map_split_fails_on_turn_without_content() {
        let split = DatasetSplit::new(SplitName::Train, vec![record(json!({"chats": [{"role": "user"}]}))]);
        let err = map_split(split, &ChatTemplate::llama3()).unwrap_err().to_string();
        assert!(err.contains("train record[0]"), "{err}");
        assert!(err.contains("content"), "{err}");
    }

    #[test]
    fn test_dataset_id_stable_and_content_sensitive() {
        let template = ChatTemplate::llama3();
        let train = map_split(sample_split(SplitName::Train), &template).unwrap();
        let test = map_split(sample_split(SplitName::Test), &template).unwrap();

        let id1 = compute_dataset_id(&[train.clone(), test.clone()]).unwrap();
        let id2 = compute_dataset_id(&[train.clone(), test]).unwrap();
        let id3 = compute_dataset_id(&[train]).unwrap();
        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[tokio::test]
    async fn test_jsonl_dir_loader_round_trips_written_split() {
        let temp = TempDir::new().unwrap();
        let loader = JsonlDirLoader::new(temp.path().to_path_buf());
        let split = sample_split(SplitName::Train);
        write_jsonl_split(&loader.split_path(SplitName::Train), &split).unwrap();

        let loaded = loader.load_split("ignored/dataset", SplitName::Train).await.unwrap();
        assert_eq!(loaded, split);

        let missing = loader.load_split("ignored/dataset", SplitName::Test).await;
        assert!(matches!(missing, Err(TrainingError::Dataset(_))));
    }

    #[test]
    fn test_read_jsonl_reports_line_number() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.jsonl");
        std::fs::write(&path, "{\"chats\": []}\n\nnot json\n").unwrap();

        let err = read_jsonl_split(&path, SplitName::Train).unwrap_err().to_string();
        assert!(err.contains("line 3"), "{err}");
    }
}
