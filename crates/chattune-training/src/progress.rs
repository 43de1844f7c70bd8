use crate::job::TrainingJobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { job_id: TrainingJobId },
    Message { job_id: TrainingJobId, message: String },
    Step { job_id: TrainingJobId, step: u64, total: Option<u64>, loss: Option<f64> },
    Eval { job_id: TrainingJobId, step: u64, eval_loss: Option<f64> },
    Checkpoint { job_id: TrainingJobId, step: u64, path: PathBuf },
    Finished { job_id: TrainingJobId },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => println!("[train:{job_id}] started"),
            ProgressEvent::Message { job_id, message } => println!("[train:{job_id}] {message}"),
            ProgressEvent::Step { job_id, step, total, loss } => {
                let loss = loss.map(|l| format!(" loss={l:.4}")).unwrap_or_default();
                if let Some(total) = total {
                    println!("[train:{job_id}] step {step}/{total}{loss}");
                } else {
                    println!("[train:{job_id}] step {step}{loss}");
                }
            }
            ProgressEvent::Eval { job_id, step, eval_loss } => match eval_loss {
                Some(l) => println!("[train:{job_id}] eval @ step {step} eval_loss={l:.4}"),
                None => println!("[train:{job_id}] eval @ step {step}"),
            },
            ProgressEvent::Checkpoint { job_id, step, path } => {
                println!("[train:{job_id}] checkpoint @ step {step}: {}", path.display());
            }
            ProgressEvent::Finished { job_id } => println!("[train:{job_id}] finished"),
        }
    }
}

/// Emits progress as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { job_id } => tracing::info!(%job_id, "training started"),
            ProgressEvent::Message { job_id, message } => tracing::info!(%job_id, "{message}"),
            ProgressEvent::Step { job_id, step, total, loss } => {
                tracing::info!(%job_id, step, total, loss, "step");
            }
            ProgressEvent::Eval { job_id, step, eval_loss } => tracing::info!(%job_id, step, eval_loss, "eval"),
            ProgressEvent::Checkpoint { job_id, step, path } => {
                tracing::info!(%job_id, step, path = %path.display(), "checkpoint saved");
            }
            ProgressEvent::Finished { job_id } => tracing::info!(%job_id, "training finished"),
        }
    }
}
