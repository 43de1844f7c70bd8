//! Offline dataset formatting.

use crate::commands::types::PrepareArgs;
use anyhow::{Context, Result};
use chattune_training::{map_split, write_jsonl_split, ChatTemplate, DatasetLoader, JsonlDirLoader, SplitName};
use colored::Colorize;
use serde_json::json;

pub async fn execute(args: PrepareArgs) -> Result<()> {
    let loader = JsonlDirLoader::new(args.input.clone());
    let template = ChatTemplate::llama3();

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {}", args.output.display()))?;

    let mut counts = Vec::with_capacity(SplitName::ALL.len());
    for split in SplitName::ALL {
        let raw = loader
            .load_split("", split)
            .await
            .with_context(|| format!("Failed to load {split} split from {}", args.input.display()))?;
        let formatted = map_split(raw, &template)?;
        let path = args.output.join(format!("{split}.jsonl"));
        write_jsonl_split(&path, &formatted).with_context(|| format!("Failed to write {}", path.display()))?;
        counts.push((split, formatted.len(), path));
    }

    if args.json {
        let out: Vec<_> = counts
            .iter()
            .map(|(split, records, path)| json!({ "split": split, "records": records, "path": path }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Formatted dataset".bold().cyan());
    for (split, records, path) in counts {
        println!("  {:<6} {:>6} records  {}", split.to_string(), records, path.display().to_string().dimmed());
    }
    println!();
    Ok(())
}
