//! Training command implementation.

use crate::commands::types::TrainArgs;
use anyhow::{Context, Result};
use chattune_core::{CliConfig, HubDatasetLoader, RuntimeBackend};
use chattune_training::{
    DatasetLoader, FineTunePipeline, JsonlDirLoader, ProgressSink, RunConfig, RunManifest, StdoutProgressSink,
    TracingProgressSink, TrainingLayout,
};
use colored::Colorize;
use std::path::PathBuf;

pub async fn execute(args: TrainArgs, cli_config: &CliConfig) -> Result<()> {
    let config = RunConfig::from_env().context("Failed to assemble run configuration")?;

    let runtime = cli_config.runtime.clone().context(
        "No runtime worker configured. Set CHATTUNE_RUNTIME or add a [runtime] table to the configuration file.",
    )?;

    let output_dir = args.output_dir.or_else(|| cli_config.output_dir.clone()).unwrap_or_else(|| PathBuf::from("outputs"));
    let export_dir = args.export_dir.or_else(|| cli_config.export_dir.clone()).unwrap_or_else(|| PathBuf::from("."));
    let layout = TrainingLayout::new(output_dir, export_dir);

    let loader: Box<dyn DatasetLoader> = match &args.dataset_dir {
        Some(dir) => Box::new(JsonlDirLoader::new(dir.clone())),
        None => Box::new(HubDatasetLoader::new(Some(&config.token)).context("Failed to create Hub client")?),
    };
    let mut backend = RuntimeBackend::new(runtime).with_token(config.token.clone());
    if let Some(project) = &config.project {
        backend = backend.with_env("WANDB_PROJECT", project);
    }
    if let Some(name) = &config.run_name {
        backend = backend.with_env("WANDB_NAME", name);
    }

    let mut pipeline = FineTunePipeline::new(loader.as_ref(), &backend, &backend, &backend, layout);
    if let Some(method) = cli_config.quantization {
        pipeline = pipeline.with_quantization(method);
    }

    if !args.json {
        println!();
        println!("{}", "Fine-tuning".bold().cyan());
        println!("  Base model: {}", config.input_model.cyan());
        println!("  Dataset:    {}", config.dataset_id().cyan());
        println!("  Publish to: {}", config.repo_id().cyan());
        println!("  Runtime:    {}", backend.command().to_string().dimmed());
        println!();
    }

    // Stdout carries only the manifest in JSON mode.
    let progress: &dyn ProgressSink = if args.json { &TracingProgressSink } else { &StdoutProgressSink };
    let manifest = pipeline.run(&config, progress).await.context("Fine-tuning run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    print_summary(&manifest, pipeline.layout());
    Ok(())
}

fn print_summary(manifest: &RunManifest, layout: &TrainingLayout) {
    println!();
    println!("{}", "Fine-tuning complete".bold().green());
    println!("  Job: {}", manifest.job_id.0.cyan());
    if let Some(loss) = manifest.metrics.train_loss {
        println!("  Train loss: {loss:.4}");
    }
    if let Some(loss) = manifest.metrics.eval_loss {
        println!("  Eval loss:  {loss:.4}");
    }
    for receipt in &manifest.publications {
        println!("  Published {} to {}", receipt.format.to_string().cyan(), receipt.repo_id.cyan());
    }
    println!("  Manifest: {}", layout.job_manifest_path(&manifest.job_id).display().to_string().dimmed());
    println!();
}
