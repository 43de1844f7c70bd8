//! The fine-tuning run, end to end.
//!
//! The pipeline is strictly linear: configuration, dataset formatting,
//! training, then export and publish of the merged and quantized models. The
//! first error stops it; nothing is retried.

use crate::artifacts::{make_artifact, ArtifactKind, ExportedModel, QuantizationMethod, RunManifest, TrainingArtifact};
use crate::config::RunConfig;
use crate::dataset::{compute_dataset_id, map_split, write_jsonl_split, DatasetLoader, DatasetSplit, SplitName};
use crate::error::TrainingResult;
use crate::job::TrainingJobSpec;
use crate::layout::TrainingLayout;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::trainer::{Exporter, Publisher, Trainer};
use std::path::Path;

pub struct FineTunePipeline<'a> {
    loader: &'a dyn DatasetLoader,
    trainer: &'a dyn Trainer,
    exporter: &'a dyn Exporter,
    publisher: &'a dyn Publisher,
    layout: TrainingLayout,
    quantization: QuantizationMethod,
}

impl<'a> FineTunePipeline<'a> {
    pub fn new(
        loader: &'a dyn DatasetLoader,
        trainer: &'a dyn Trainer,
        exporter: &'a dyn Exporter,
        publisher: &'a dyn Publisher,
        layout: TrainingLayout,
    ) -> Self {
        Self { loader, trainer, exporter, publisher, layout, quantization: QuantizationMethod::default() }
    }

    #[must_use]
    pub fn with_quantization(mut self, method: QuantizationMethod) -> Self {
        self.quantization = method;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &TrainingLayout {
        &self.layout
    }

    /// Assemble the configuration from the process environment, then run.
    pub async fn run_from_env(&self, progress: &dyn ProgressSink) -> TrainingResult<RunManifest> {
        let config = RunConfig::from_env()?;
        self.run(&config, progress).await
    }

    /// Assemble the configuration from `lookup`, then run.
    ///
    /// A missing variable fails here, before any backend is touched.
    pub async fn run_from_lookup<F>(&self, lookup: F, progress: &dyn ProgressSink) -> TrainingResult<RunManifest>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = RunConfig::from_lookup(lookup)?;
        self.run(&config, progress).await
    }

    pub async fn run(&self, config: &RunConfig, progress: &dyn ProgressSink) -> TrainingResult<RunManifest> {
        let mut job = TrainingJobSpec::from_config(config);
        job.args.output_dir = self.layout.checkpoints_dir(&job.job_id);
        job.validate()?;

        tracing::info!(
            job_id = %job.job_id,
            model = %job.base_model.model_id,
            dataset = %job.dataset_id,
            loader = self.loader.id(),
            trainer = self.trainer.id(),
            "starting fine-tuning run"
        );
        self.layout.ensure_job_dirs(&job.job_id)?;

        let splits = self.prepare_dataset(&mut job, progress).await?;
        let dataset_id = compute_dataset_id(&splits)?;
        write_json(&self.layout.job_spec_path(&job.job_id), &job)?;

        self.trainer.prepare(&job).await?;
        let metrics = self.trainer.run(&job, progress).await?;
        tracing::info!(job_id = %job.job_id, train_loss = metrics.train_loss, eval_loss = metrics.eval_loss, "training complete");

        let repo_id = config.repo_id();
        let mut publications = Vec::with_capacity(2);

        let merged_dir = self.layout.export_dir(&config.merged_dir_name());
        let merged = self.exporter.export_merged(&job, &merged_dir).await?;
        tracing::info!(path = %merged.path.display(), "exported merged model");
        publications.push(self.publisher.publish(&job, &merged, &repo_id, &config.token).await?);
        tracing::info!(repo = %repo_id, format = %merged.format, "published");

        let quantized_dir = self.layout.export_dir(&config.quantized_dir_name(self.quantization));
        let quantized = self.exporter.export_quantized(&job, &quantized_dir, self.quantization).await?;
        tracing::info!(path = %quantized.path.display(), "exported quantized model");
        publications.push(self.publisher.publish(&job, &quantized, &repo_id, &config.token).await?);
        tracing::info!(repo = %repo_id, format = %quantized.format, "published");

        let mut artifacts = Vec::new();
        for path in job.dataset_files.values() {
            artifacts.push(make_artifact(ArtifactKind::DatasetJsonl, path.clone())?);
        }
        artifacts.extend(export_artifact(ArtifactKind::MergedModel, &merged)?);
        artifacts.extend(export_artifact(ArtifactKind::QuantizedModel, &quantized)?);

        let manifest = RunManifest {
            job_id: job.job_id.clone(),
            created_at: job.created_at,
            finished_at: chrono::Utc::now(),
            base_model: job.base_model.clone(),
            dataset: job.dataset_id.clone(),
            dataset_id,
            metrics,
            artifacts,
            publications,
        };
        write_json(&self.layout.job_manifest_path(&job.job_id), &manifest)?;

        Ok(manifest)
    }

    /// Load, format and persist both splits, recording their paths on the job.
    async fn prepare_dataset(
        &self,
        job: &mut TrainingJobSpec,
        progress: &dyn ProgressSink,
    ) -> TrainingResult<Vec<DatasetSplit>> {
        let mut splits = Vec::with_capacity(SplitName::ALL.len());

        for split in SplitName::ALL {
            progress.on_event(ProgressEvent::Message {
                job_id: job.job_id.clone(),
                message: format!("loading {split} split of {}", job.dataset_id),
            });
            let raw = self.loader.load_split(&job.dataset_id, split).await?;
            let formatted = map_split(raw, &job.template)?;

            let path = self.layout.dataset_jsonl_path(&job.job_id, split);
            write_jsonl_split(&path, &formatted)?;
            tracing::info!(split = %split, records = formatted.len(), path = %path.display(), "formatted split");

            job.dataset_files.insert(split, path);
            splits.push(formatted);
        }

        Ok(splits)
    }
}

/// Exports are not verified; a path the runtime did not leave behind is skipped.
fn export_artifact(kind: ArtifactKind, model: &ExportedModel) -> TrainingResult<Option<TrainingArtifact>> {
    if !model.path.exists() {
        tracing::warn!(path = %model.path.display(), format = %model.format, "export path missing, not hashed");
        return Ok(None);
    }
    make_artifact(kind, model.path.clone()).map(Some)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
