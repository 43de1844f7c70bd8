//! Command argument definitions shared between main.rs and the commands.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Root for per-job outputs (checkpoints, formatted dataset, manifest)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Directory the exported model directories are written under
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Read `train.jsonl` and `test.jsonl` from this directory instead of the Hub
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    /// Output the run manifest as JSON (progress goes to the log on stderr)
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    /// Directory containing `train.jsonl` and `test.jsonl` with a `chats` field
    #[arg(long)]
    pub input: PathBuf,

    /// Directory to write the formatted splits to
    #[arg(long)]
    pub output: PathBuf,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunsArgs {
    /// Show the details of one run
    pub job_id: Option<String>,

    /// Root for per-job outputs
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
