use crate::dataset::SplitName;
use crate::error::TrainingResult;
use crate::job::TrainingJobId;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "run_manifest.json";
pub const JOB_SPEC_FILE: &str = "job.json";

/// Filesystem layout for a fine-tuning run.
///
/// Per-job state lives under `<root>/<job_id>/...` (default root `outputs/`);
/// exported models are written under a separate export root.
#[derive(Debug, Clone)]
pub struct TrainingLayout {
    root: PathBuf,
    export_root: PathBuf,
}

impl TrainingLayout {
    #[must_use]
    pub fn new(root: PathBuf, export_root: PathBuf) -> Self {
        Self { root, export_root }
    }

    /// `outputs/` for job state, the working directory for exports.
    #[must_use]
    pub fn for_working_dir(dir: &Path) -> Self {
        Self::new(dir.join("outputs"), dir.to_path_buf())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn export_root(&self) -> &Path {
        &self.export_root
    }

    #[must_use]
    pub fn job_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.root.join(job_id.0.as_str())
    }

    #[must_use]
    pub fn job_manifest_path(&self, job_id: &TrainingJobId) -> PathBuf {
        self.job_dir(job_id).join(MANIFEST_FILE)
    }

    #[must_use]
    pub fn job_spec_path(&self, job_id: &TrainingJobId) -> PathBuf {
        self.job_dir(job_id).join(JOB_SPEC_FILE)
    }

    #[must_use]
    pub fn dataset_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.job_dir(job_id).join("dataset")
    }

    #[must_use]
    pub fn dataset_jsonl_path(&self, job_id: &TrainingJobId, split: SplitName) -> PathBuf {
        self.dataset_dir(job_id).join(format!("{split}.jsonl"))
    }

    #[must_use]
    pub fn checkpoints_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.job_dir(job_id).join("checkpoints")
    }

    #[must_use]
    pub fn export_dir(&self, name: &str) -> PathBuf {
        self.export_root.join(name)
    }

    pub fn ensure_job_dirs(&self, job_id: &TrainingJobId) -> TrainingResult<()> {
        std::fs::create_dir_all(self.dataset_dir(job_id))?;
        std::fs::create_dir_all(self.checkpoints_dir(job_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = TrainingLayout::for_working_dir(temp.path());
        let id = TrainingJobId("job-1".to_string());

        assert!(layout.root().ends_with("outputs"));
        assert!(layout.job_dir(&id).ends_with("outputs/job-1"));
        assert!(layout.dataset_jsonl_path(&id, SplitName::Test).ends_with("job-1/dataset/test.jsonl"));
        assert_eq!(layout.export_dir("m_q4_k_m"), temp.path().join("m_q4_k_m"));

        layout.ensure_job_dirs(&id).unwrap();
        assert!(layout.checkpoints_dir(&id).is_dir());
    }
}
