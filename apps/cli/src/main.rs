//! chattune CLI - fine-tune a chat model on a Hub dataset and publish it
//!
//! The `chattune` command drives the fine-tuning pipeline: dataset formatting
//! with the Llama-3 chat template, LoRA training through an external runtime
//! worker, then export and publish of the merged and quantized models.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::{PrepareArgs, RunsArgs, TrainArgs};

/// chattune - chat fine-tuning orchestration
#[derive(Parser, Debug)]
#[command(
    name = "chattune",
    author,
    version,
    about = "Fine-tune a chat model and publish merged and GGUF exports",
    long_about = "chattune formats a Hub chat dataset with the Llama-3 template, trains LoRA adapters through an external runtime worker, and publishes a merged 16-bit model and a quantized GGUF model.\nRun identity comes from HF_INPUT_MODEL, HF_ACCOUNT, HF_DATASET, HF_OUTPUT_MODEL and HF_TOKEN."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (overrides ~/.chattune/config.toml and ./.chattunerc)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full fine-tuning pipeline
    ///
    /// Reads the run configuration from the environment, formats the dataset,
    /// trains, then exports and publishes both model formats.
    Train(TrainArgs),

    /// Format local chat splits without training
    ///
    /// Reads `train.jsonl` and `test.jsonl` from the input directory and writes
    /// the formatted splits to the output directory.
    Prepare(PrepareArgs),

    /// List completed runs
    Runs(RunsArgs),
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let cli_config = config::load_config(args.config.as_deref())?;

    // Initialize tracing
    let level = args.log_level.as_deref().or(cli_config.log_level.as_deref()).map_or(Level::INFO, parse_level);
    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Train(train_args) => commands::train::execute(train_args, &cli_config).await,
        Command::Prepare(prepare_args) => commands::prepare::execute(prepare_args).await,
        Command::Runs(runs_args) => commands::runs::execute(runs_args, &cli_config),
    }
}
