use crate::artifacts::{ArtifactKind, RunManifest};
use crate::error::{TrainingError, TrainingResult};
use crate::layout::MANIFEST_FILE;
use std::path::{Path, PathBuf};

/// A completed run found on disk.
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub manifest_path: PathBuf,
    pub manifest: RunManifest,
}

impl RunEntry {
    /// Path of the first artifact of `kind`, if the run produced one.
    #[must_use]
    pub fn artifact_path(&self, kind: &ArtifactKind) -> Option<&Path> {
        self.manifest.artifacts.iter().find(|a| &a.kind == kind).map(|a| a.path.as_path())
    }
}

fn read_manifest(path: &Path) -> TrainingResult<RunManifest> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice::<RunManifest>(&bytes)?)
}

/// Discover completed runs by scanning `<root>/*/run_manifest.json`, newest first.
///
/// Job directories without a manifest (failed or in-flight runs) are skipped.
pub fn discover_runs(root: &Path) -> TrainingResult<Vec<RunEntry>> {
    let mut out = Vec::new();

    let dir = match std::fs::read_dir(root) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        let job_dir = entry.path();
        if !job_dir.is_dir() {
            continue;
        }
        let manifest_path = job_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            continue;
        }
        let manifest = read_manifest(&manifest_path)?;
        out.push(RunEntry { manifest_path, manifest });
    }

    out.sort_by(|a, b| b.manifest.finished_at.cmp(&a.manifest.finished_at));
    Ok(out)
}

/// Resolve a single run by job id.
pub fn find_run(root: &Path, job_id: &str) -> TrainingResult<RunEntry> {
    let manifest_path = root.join(job_id).join(MANIFEST_FILE);
    if !manifest_path.exists() {
        return Err(TrainingError::InvalidSpec(format!("run not found (missing manifest): {job_id}")));
    }
    let manifest = read_manifest(&manifest_path)?;
    Ok(RunEntry { manifest_path, manifest })
}
