use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use teamflow_core::{StepResult, TaskStatus};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// One line of the progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressLogEntry {
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    /// `step` or `lifecycle`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProgressLogEntry {
    pub fn step(task_id: &str, result: &StepResult) -> Self {
        Self {
            timestamp: result.completed_at,
            task_id: task_id.to_string(),
            kind: "step".to_string(),
            step: Some(result.step.clone()),
            status: if result.defaulted {
                "defaulted".to_string()
            } else {
                result.status.to_string()
            },
            detail: result.error.clone(),
        }
    }

    pub fn lifecycle(task_id: &str, status: TaskStatus, detail: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            task_id: task_id.to_string(),
            kind: "lifecycle".to_string(),
            step: None,
            status: status.to_string(),
            detail,
        }
    }
}

/// Write-through record of task progress. Never on the correctness path:
/// implementations swallow their own I/O errors.
pub trait ProgressLog: Send + Sync {
    fn record(&self, entry: ProgressLogEntry);
}

/// Discards everything.
pub struct NoopProgressLog;

impl ProgressLog for NoopProgressLog {
    fn record(&self, _entry: ProgressLogEntry) {}
}

enum LogMessage {
    Entry(ProgressLogEntry),
    Flush(oneshot::Sender<()>),
}

/// Append-only JSONL progress log written by a background task.
pub struct JsonlProgressLog {
    tx: mpsc::UnboundedSender<LogMessage>,
    path: PathBuf,
}

impl JsonlProgressLog {
    /// Spawns the writer task; must be called inside a tokio runtime.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();
        let file_path = path.clone();

        tokio::spawn(async move {
            if let Some(parent) = file_path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)
                .await
            {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(path = %file_path.display(), error = %e, "Progress log unavailable");
                    None
                }
            };

            while let Some(message) = rx.recv().await {
                match message {
                    LogMessage::Entry(entry) => {
                        let (Some(f), Ok(line)) = (file.as_mut(), serde_json::to_string(&entry))
                        else {
                            continue;
                        };
                        if let Err(e) = f.write_all(format!("{line}\n").as_bytes()).await {
                            warn!(error = %e, "Progress log write failed");
                        }
                    }
                    LogMessage::Flush(done) => {
                        if let Some(f) = file.as_mut() {
                            let _ = f.flush().await;
                        }
                        let _ = done.send(());
                    }
                }
            }
        });

        info!(path = %path.display(), "Progress log enabled");
        Self { tx, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until everything recorded so far has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(LogMessage::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl ProgressLog for JsonlProgressLog {
    fn record(&self, entry: ProgressLogEntry) {
        let _ = self.tx.send(LogMessage::Entry(entry));
    }
}
