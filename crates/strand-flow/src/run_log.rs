use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use strand_core::event::EventBus;
use strand_core::types::FlowEvent;

/// JSONL run logger.
///
/// Listens on the event bus and appends one JSON object per line. Lines are
/// flushed as they are written, so a crashed run still leaves a readable log.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    flow: String,
    event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl LogEntry {
    fn new(flow: &str, event_type: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            flow: flow.to_string(),
            event_type: event_type.to_string(),
            run_id: None,
            node_id: None,
            detail: None,
        }
    }
}

impl RunLogger {
    /// Logs go to `{log_dir}/{flow}/{timestamp}.jsonl`.
    /// `level`: 1 = run summary, 2 = + node states and usage, 3 = + node log events.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and log in a background task until the run stops or
    /// `cancel` fires. Subscribing before the task starts means no event
    /// published after this call is missed.
    pub fn spawn(
        self,
        event_bus: &EventBus,
        flow: impl Into<String>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, flow.into(), cancel))
    }

    async fn run(self, mut rx: broadcast::Receiver<FlowEvent>, flow: String, cancel: CancellationToken) {
        let flow_dir = self.log_dir.join(&flow);
        if let Err(e) = tokio::fs::create_dir_all(&flow_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = flow_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");

        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let Some(entry) = self.event_to_entry(&flow, &event) else {
                                continue;
                            };

                            if let Ok(json) = serde_json::to_string(&entry) {
                                let line = format!("{}\n", json);
                                if let Err(e) = writer.write_all(line.as_bytes()).await {
                                    error!(error = %e, "Failed to write log entry");
                                    break;
                                }
                                if let Err(e) = writer.flush().await {
                                    error!(error = %e, "Failed to flush log");
                                }
                            }

                            if matches!(event, FlowEvent::RunStopped { .. }) {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert a flow event to a log entry (None if filtered by level).
    fn event_to_entry(&self, flow: &str, event: &FlowEvent) -> Option<LogEntry> {
        match event {
            // L1: run summary
            FlowEvent::RunStarted { run_id } => Some(LogEntry {
                run_id: Some(run_id.to_string()),
                ..LogEntry::new(flow, "run_started")
            }),
            FlowEvent::RunStopped { run_id, summary } => Some(LogEntry {
                run_id: Some(run_id.to_string()),
                detail: Some(serde_json::json!({
                    "duration": summary.duration_display(),
                    "duration_ms": summary.duration_ms(),
                    "in_tokens": summary.in_tokens,
                    "out_tokens": summary.out_tokens,
                    "amount": summary.amount_display(),
                })),
                ..LogEntry::new(flow, "run_stopped")
            }),

            // L2: node states and usage
            FlowEvent::NodeStateChanged { node_id, state } if self.level >= 2 => Some(LogEntry {
                node_id: Some(node_id.clone()),
                detail: Some(serde_json::json!({ "state": state })),
                ..LogEntry::new(flow, "node_state")
            }),
            FlowEvent::UsageUpdate {
                in_tokens,
                out_tokens,
                amount,
            } if self.level >= 2 => Some(LogEntry {
                detail: Some(serde_json::json!({
                    "in_tokens": in_tokens,
                    "out_tokens": out_tokens,
                    "amount": amount,
                })),
                ..LogEntry::new(flow, "usage_update")
            }),

            // L3: node log events
            FlowEvent::NodeLog(log) if self.level >= 3 => Some(LogEntry {
                node_id: Some(log.id.clone()),
                detail: Some(serde_json::json!({
                    "node_type": log.node_type,
                    "level": log.level,
                    "title": log.title,
                    "payload": log.payload.as_ref().map(|p| truncate_json(p, 500)),
                })),
                ..LogEntry::new(flow, "node_log")
            }),

            _ => None,
        }
    }
}

/// Truncate a JSON value for logging, on a character boundary.
fn truncate_json(value: &serde_json::Value, max_len: usize) -> String {
    let s = value.to_string();
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
