//! Listing and inspection of completed runs.

use crate::commands::types::RunsArgs;
use anyhow::{Context, Result};
use chattune_core::CliConfig;
use chattune_training::{discover_runs, find_run, ArtifactKind, RunEntry};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;

pub fn execute(args: RunsArgs, cli_config: &CliConfig) -> Result<()> {
    let root = args.output_dir.or_else(|| cli_config.output_dir.clone()).unwrap_or_else(|| PathBuf::from("outputs"));
    if let Some(job_id) = args.job_id {
        let run = find_run(&root, &job_id).with_context(|| format!("Failed to load run {job_id}"))?;
        return show_run(&run, args.json);
    }

    let runs = discover_runs(&root).with_context(|| format!("Failed to discover runs under {}", root.display()))?;

    if args.json {
        let out: Vec<_> = runs
            .iter()
            .map(|r| {
                json!({
                    "job_id": r.manifest.job_id.0,
                    "finished_at": r.manifest.finished_at,
                    "base_model": r.manifest.base_model.model_id,
                    "dataset": r.manifest.dataset,
                    "metrics": r.manifest.metrics,
                    "merged_model": r.artifact_path(&ArtifactKind::MergedModel),
                    "quantized_model": r.artifact_path(&ArtifactKind::QuantizedModel),
                    "publications": r.manifest.publications,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Runs ({})", runs.len()).bold().cyan());
    println!();

    if runs.is_empty() {
        println!("  {}", format!("No completed runs found under {}.", root.display()).dimmed());
        return Ok(());
    }

    println!("{:<38} {:<20} {:<10} {}", "Job", "Finished", "Loss", "Dataset");
    println!("{}", "─".repeat(100));
    for run in runs {
        let loss = run.manifest.metrics.train_loss.map_or_else(|| "-".to_string(), |l| format!("{l:.4}"));
        println!(
            "{:<38} {:<20} {:<10} {}",
            run.manifest.job_id.0.cyan(),
            run.manifest.finished_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            loss,
            run.manifest.dataset
        );
    }
    println!();
    Ok(())
}

fn show_run(run: &RunEntry, json_output: bool) -> Result<()> {
    let manifest = &run.manifest;
    if json_output {
        println!("{}", serde_json::to_string_pretty(manifest)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Run {}", manifest.job_id).bold().cyan());
    println!("  Base model: {}", manifest.base_model.model_id);
    println!("  Dataset:    {} ({})", manifest.dataset, manifest.dataset_id.0.dimmed());
    println!("  Started:    {}", manifest.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Finished:   {}", manifest.finished_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(loss) = manifest.metrics.train_loss {
        println!("  Train loss: {loss:.4}");
    }
    if let Some(loss) = manifest.metrics.eval_loss {
        println!("  Eval loss:  {loss:.4}");
    }
    if let Some(steps) = manifest.metrics.steps {
        println!("  Steps:      {steps}");
    }

    println!();
    println!("  {}", "Artifacts".bold());
    for artifact in &manifest.artifacts {
        let kind = format!("{:?}", artifact.kind);
        println!("    {:<16} {}  {}", kind, artifact.path.display(), artifact.sha256.dimmed());
    }
    if !manifest.publications.is_empty() {
        println!();
        println!("  {}", "Publications".bold());
        for receipt in &manifest.publications {
            let reference = receipt.reference.as_deref().unwrap_or("-");
            println!("    {:<16} {}  {}", receipt.format.to_string(), receipt.repo_id.cyan(), reference.dimmed());
        }
    }
    println!("  Manifest: {}", run.manifest_path.display().to_string().dimmed());
    println!();
    Ok(())
}
