//! External runtime worker.
//!
//! The ML framework (quantized loading, adapters, the training loop, merged and
//! GGUF export, registry push) lives in a separate worker program. Each
//! operation spawns `{program} {args..} {operation}`, writes one JSON request to
//! its stdin and reads JSON messages from its stdout, one per line.

use async_trait::async_trait;
use chattune_training::{
    ExportFormat, ExportedModel, Exporter, ProgressEvent, ProgressSink, PublishReceipt, Publisher,
    QuantizationMethod, SecretString, Trainer, TrainerStatus, TrainingError, TrainingJobId, TrainingJobSpec,
    TrainingMetrics, TrainingResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;

const STDERR_TAIL_LINES: usize = 20;

/// Program and leading arguments of the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl RuntimeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Parse a whitespace-separated command line such as `python worker.py`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }
}

impl std::fmt::Display for RuntimeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Prepare,
    Train,
    ExportMerged,
    ExportQuantized,
    Publish,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Train => "train",
            Self::ExportMerged => "export-merged",
            Self::ExportQuantized => "export-quantized",
            Self::Publish => "publish",
        }
    }
}

#[derive(Debug, Serialize)]
struct RuntimeRequest<'a> {
    operation: &'static str,
    job: &'a TrainingJobSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dir: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantization: Option<QuantizationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a ExportedModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_id: Option<&'a str>,
}

impl<'a> RuntimeRequest<'a> {
    fn new(operation: Operation, job: &'a TrainingJobSpec) -> Self {
        Self {
            operation: operation.as_str(),
            job,
            chat_template: None,
            dir: None,
            quantization: None,
            model: None,
            repo_id: None,
        }
    }
}

/// A line of worker output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    Log {
        message: String,
    },
    Step {
        step: u64,
        #[serde(default)]
        total: Option<u64>,
        #[serde(default)]
        loss: Option<f64>,
    },
    Eval {
        step: u64,
        #[serde(default)]
        eval_loss: Option<f64>,
    },
    Checkpoint {
        step: u64,
        path: PathBuf,
    },
    Result {
        #[serde(default)]
        value: serde_json::Value,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct ExportResult {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PublishResult {
    reference: Option<String>,
}

fn runtime_error(operation: Operation, message: impl Into<String>) -> TrainingError {
    TrainingError::Runtime { operation: operation.as_str().to_string(), message: message.into() }
}

fn parse_result<T: serde::de::DeserializeOwned + Default>(
    operation: Operation,
    value: serde_json::Value,
) -> TrainingResult<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| runtime_error(operation, format!("malformed result: {e}")))
}

/// Runs every external operation through the worker program.
#[derive(Clone)]
pub struct RuntimeBackend {
    command: RuntimeCommand,
    token: Option<SecretString>,
    env: Vec<(String, String)>,
    statuses: Arc<Mutex<HashMap<String, TrainerStatus>>>,
    cancels: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl RuntimeBackend {
    #[must_use]
    pub fn new(command: RuntimeCommand) -> Self {
        Self {
            command,
            token: None,
            env: Vec::new(),
            statuses: Arc::new(Mutex::new(HashMap::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Token handed to the worker as `HF_TOKEN` for gated downloads.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Extra environment for the worker (e.g. experiment-tracking settings).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn command(&self) -> &RuntimeCommand {
        &self.command
    }

    fn set_status(&self, job_id: &TrainingJobId, status: TrainerStatus) {
        if let Ok(mut s) = self.statuses.lock() {
            s.insert(job_id.0.clone(), status);
        }
    }

    /// Move a job to `Running` unless it was cancelled before it started.
    fn begin_run(&self, job_id: &TrainingJobId) -> bool {
        let Ok(mut s) = self.statuses.lock() else {
            return true;
        };
        if s.get(&job_id.0) == Some(&TrainerStatus::Cancelled) {
            return false;
        }
        s.insert(job_id.0.clone(), TrainerStatus::Running);
        true
    }

    /// Handle `cancel` notifies; shared by every call in flight for the job.
    fn cancel_handle(&self, job_id: &TrainingJobId) -> Arc<Notify> {
        match self.cancels.lock() {
            Ok(mut c) => c.entry(job_id.0.clone()).or_insert_with(|| Arc::new(Notify::new())).clone(),
            Err(_) => Arc::new(Notify::new()),
        }
    }

    fn clear_cancel_handle(&self, job_id: &TrainingJobId) {
        if let Ok(mut c) = self.cancels.lock() {
            c.remove(&job_id.0);
        }
    }

    async fn invoke(
        &self,
        operation: Operation,
        request: &RuntimeRequest<'_>,
        token: Option<&SecretString>,
        progress: Option<&dyn ProgressSink>,
    ) -> TrainingResult<serde_json::Value> {
        let job_id = &request.job.job_id;
        let cancel = self.cancel_handle(job_id);
        let outcome = self.drive(operation, request, token, progress, &cancel).await;
        self.clear_cancel_handle(job_id);
        outcome
    }

    async fn drive(
        &self,
        operation: Operation,
        request: &RuntimeRequest<'_>,
        token: Option<&SecretString>,
        progress: Option<&dyn ProgressSink>,
        cancel: &Notify,
    ) -> TrainingResult<serde_json::Value> {
        let job_id = request.job.job_id.clone();
        let body = serde_json::to_vec(request)?;

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .arg(operation.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(token) = token.or(self.token.as_ref()) {
            cmd.env("HF_TOKEN", token.expose_secret());
        }

        tracing::debug!(job_id = %job_id, operation = operation.as_str(), program = %self.command.program, "spawning runtime");
        let mut child = cmd
            .spawn()
            .map_err(|e| runtime_error(operation, format!("failed to spawn `{}`: {e}", self.command.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&body).await {
                Ok(()) => {}
                // The worker may exit without reading its request; its exit status reports that.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stdout = child.stdout.take().ok_or_else(|| runtime_error(operation, "stdout not captured"))?;
        let stderr = child.stderr.take().ok_or_else(|| runtime_error(operation, "stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "chattune::runtime", "{line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut result = None;
        let mut reported_error = None;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match serde_json::from_str::<RuntimeMessage>(&line) {
                        Ok(RuntimeMessage::Result { value }) => result = Some(value),
                        Ok(RuntimeMessage::Error { message }) => reported_error = Some(message),
                        Ok(message) => forward(&job_id, message, progress),
                        Err(_) => tracing::debug!(target: "chattune::runtime", "{line}"),
                    }
                }
                () = cancel.notified() => {
                    child.start_kill()?;
                    let _ = child.wait().await;
                    return Err(runtime_error(operation, "cancelled"));
                }
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if let Some(message) = reported_error {
            return Err(runtime_error(operation, message));
        }
        if !status.success() {
            let detail = if stderr_tail.is_empty() { String::new() } else { format!(":\n{stderr_tail}") };
            return Err(runtime_error(operation, format!("worker exited with {status}{detail}")));
        }
        result.ok_or_else(|| runtime_error(operation, "worker exited without a result"))
    }
}

fn forward(job_id: &TrainingJobId, message: RuntimeMessage, progress: Option<&dyn ProgressSink>) {
    let event = match message {
        RuntimeMessage::Log { message } => {
            tracing::info!(target: "chattune::runtime", %job_id, "{message}");
            return;
        }
        RuntimeMessage::Step { step, total, loss } => {
            ProgressEvent::Step { job_id: job_id.clone(), step, total, loss }
        }
        RuntimeMessage::Eval { step, eval_loss } => ProgressEvent::Eval { job_id: job_id.clone(), step, eval_loss },
        RuntimeMessage::Checkpoint { step, path } => {
            ProgressEvent::Checkpoint { job_id: job_id.clone(), step, path }
        }
        RuntimeMessage::Result { .. } | RuntimeMessage::Error { .. } => return,
    };
    if let Some(progress) = progress {
        progress.on_event(event);
    }
}

#[async_trait]
impl Trainer for RuntimeBackend {
    fn id(&self) -> &'static str {
        "runtime"
    }

    async fn prepare(&self, job: &TrainingJobSpec) -> TrainingResult<()> {
        job.validate()?;
        job.require_dataset_files()?;
        self.set_status(&job.job_id, TrainerStatus::Preparing);

        let mut request = RuntimeRequest::new(Operation::Prepare, job);
        request.chat_template = Some(job.template.jinja());

        match self.invoke(Operation::Prepare, &request, None, None).await {
            Ok(_) => {
                self.set_status(&job.job_id, TrainerStatus::Idle);
                Ok(())
            }
            Err(e) => {
                self.set_status(&job.job_id, TrainerStatus::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&self, job: &TrainingJobSpec, progress: &dyn ProgressSink) -> TrainingResult<TrainingMetrics> {
        let job_id = job.job_id.clone();
        // Registered before the status check so a cancel racing the spawn still lands.
        self.cancel_handle(&job_id);
        if !self.begin_run(&job_id) {
            self.clear_cancel_handle(&job_id);
            return Err(runtime_error(Operation::Train, "cancelled"));
        }
        progress.on_event(ProgressEvent::Started { job_id: job_id.clone() });

        let request = RuntimeRequest::new(Operation::Train, job);
        let outcome = self
            .invoke(Operation::Train, &request, None, Some(progress))
            .await
            .and_then(|value| parse_result::<TrainingMetrics>(Operation::Train, value));

        match outcome {
            Ok(metrics) => {
                self.set_status(&job_id, TrainerStatus::Finished);
                progress.on_event(ProgressEvent::Finished { job_id });
                Ok(metrics)
            }
            Err(e) => {
                let cancelled = matches!(self.status(&job_id).await, Ok(TrainerStatus::Cancelled));
                if !cancelled {
                    self.set_status(&job_id, TrainerStatus::Failed(e.to_string()));
                }
                Err(e)
            }
        }
    }

    async fn status(&self, job_id: &TrainingJobId) -> TrainingResult<TrainerStatus> {
        Ok(self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(&job_id.0).cloned())
            .unwrap_or(TrainerStatus::Idle))
    }

    async fn cancel(&self, job_id: &TrainingJobId) -> TrainingResult<()> {
        self.set_status(job_id, TrainerStatus::Cancelled);
        if let Some(notify) = self.cancels.lock().ok().and_then(|c| c.get(&job_id.0).cloned()) {
            notify.notify_one();
        }
        Ok(())
    }
}

#[async_trait]
impl Exporter for RuntimeBackend {
    async fn export_merged(&self, job: &TrainingJobSpec, dir: &Path) -> TrainingResult<ExportedModel> {
        let mut request = RuntimeRequest::new(Operation::ExportMerged, job);
        request.dir = Some(dir);

        let value = self.invoke(Operation::ExportMerged, &request, None, None).await?;
        let result: ExportResult = parse_result(Operation::ExportMerged, value)?;
        Ok(ExportedModel { format: ExportFormat::Merged16Bit, path: result.path.unwrap_or_else(|| dir.to_path_buf()) })
    }

    async fn export_quantized(
        &self,
        job: &TrainingJobSpec,
        dir: &Path,
        method: QuantizationMethod,
    ) -> TrainingResult<ExportedModel> {
        let mut request = RuntimeRequest::new(Operation::ExportQuantized, job);
        request.dir = Some(dir);
        request.quantization = Some(method);

        let value = self.invoke(Operation::ExportQuantized, &request, None, None).await?;
        let result: ExportResult = parse_result(Operation::ExportQuantized, value)?;
        Ok(ExportedModel {
            format: ExportFormat::Gguf { quantization: method },
            path: result.path.unwrap_or_else(|| dir.to_path_buf()),
        })
    }
}

#[async_trait]
impl Publisher for RuntimeBackend {
    async fn publish(
        &self,
        job: &TrainingJobSpec,
        model: &ExportedModel,
        repo_id: &str,
        token: &SecretString,
    ) -> TrainingResult<PublishReceipt> {
        let mut request = RuntimeRequest::new(Operation::Publish, job);
        request.model = Some(model);
        request.repo_id = Some(repo_id);

        let value = self.invoke(Operation::Publish, &request, Some(token), None).await?;
        let result: PublishResult = parse_result(Operation::Publish, value)?;
        Ok(PublishReceipt { repo_id: repo_id.to_string(), format: model.format, reference: result.reference })
    }
}
